//! Data-root resolution and directory bootstrap.
//!
//! Hosted deployments mount a persistent disk at `/var/data`; everywhere
//! else the data root is a project-local `local_data/`. All subdirectories
//! are created on construction.
use std::path::Path;
use std::path::PathBuf;

/// Returns true when running in a hosted environment (persistent disk).
pub fn hosted() -> bool {
    std::env::var("HOSTED").map(|v| v == "true").unwrap_or(false) || Path::new("/var/data").exists()
}

/// Resolved filesystem layout for one dataset.
#[derive(Debug, Clone)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    /// Resolves the data root from the environment and creates the
    /// `database/`, `logs/`, and `archive/` subdirectories.
    pub fn resolve() -> anyhow::Result<Self> {
        let root = if hosted() {
            PathBuf::from("/var/data")
        } else {
            PathBuf::from("local_data")
        };
        Self::at(root)
    }

    /// Uses an explicit root. Test entry point.
    pub fn at(root: PathBuf) -> anyhow::Result<Self> {
        let this = Self { root };
        std::fs::create_dir_all(this.database_dir())?;
        std::fs::create_dir_all(this.logs_dir())?;
        std::fs::create_dir_all(this.archive_dir())?;
        Ok(this)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
    pub fn database_dir(&self) -> PathBuf {
        self.root.join("database")
    }
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
    pub fn archive_dir(&self) -> PathBuf {
        self.root.join("archive")
    }
    /// Archive subdirectory for one finished date, created on demand.
    pub fn archive_subdir(&self, date: &str) -> anyhow::Result<PathBuf> {
        let dir = self.archive_dir().join(date);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
    /// Primary (raw) store.
    pub fn poker_db(&self) -> PathBuf {
        self.database_dir().join("poker.db")
    }
    /// Analytic (derived) store.
    pub fn heavy_db(&self) -> PathBuf {
        self.database_dir().join("heavy_analysis.db")
    }
    /// Marker written once the hosted initial wipe has been performed.
    pub fn first_deploy_marker(&self) -> PathBuf {
        self.database_dir().join(".first_deploy_done")
    }

    /// True until the hosted initial wipe has run once.
    pub fn first_deploy_pending(&self) -> bool {
        !self.first_deploy_marker().exists()
    }

    /// Records that the initial wipe happened.
    pub fn mark_first_deploy(&self) -> anyhow::Result<()> {
        std::fs::write(
            self.first_deploy_marker(),
            format!("First deploy completed: {}", chrono::Local::now().to_rfc3339()),
        )?;
        Ok(())
    }

    /// Deletes both databases and their WAL/SHM siblings. Used by the
    /// first-deploy wipe and `--no-clean`-less local starts.
    pub fn wipe_databases(&self) -> anyhow::Result<usize> {
        let mut removed = 0;
        for db in [self.poker_db(), self.heavy_db()] {
            for suffix in ["", "-wal", "-shm"] {
                let path = PathBuf::from(format!("{}{}", db.display(), suffix));
                if path.exists() {
                    std::fs::remove_file(&path)?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_layout_and_marker_roundtrip() {
        let tmp = std::env::temp_dir().join(format!("hl-paths-{}", std::process::id()));
        let paths = Paths::at(tmp.clone()).unwrap();
        assert!(paths.database_dir().is_dir());
        assert!(paths.logs_dir().is_dir());
        assert!(paths.first_deploy_pending());
        paths.mark_first_deploy().unwrap();
        assert!(!paths.first_deploy_pending());
        std::fs::remove_dir_all(tmp).unwrap();
    }
}
