//! File-based coordination between the ingesting writer and other readers.
//!
//! Presence of the lock file means in-progress; creation is atomic via
//! `create_new` (O_EXCL). Both locks release on Drop, normal or error exit.
use std::path::Path;
use std::path::PathBuf;

/// Exclusive writer lock for one database file, `<db>.lock` alongside it.
///
/// Acquisition waits up to [`hl_core::LOCK_WAIT`] before failing the stage.
pub struct DbLock {
    path: PathBuf,
}

impl DbLock {
    pub fn lock_path(db: &Path) -> PathBuf {
        let mut name = db.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        db.with_file_name(name)
    }

    pub fn acquire(db: &Path) -> anyhow::Result<Self> {
        let path = Self::lock_path(db);
        let deadline = std::time::Instant::now() + hl_core::LOCK_WAIT;
        loop {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if std::time::Instant::now() >= deadline {
                        anyhow::bail!(
                            "timed out waiting for write lock {}",
                            path.display()
                        );
                    }
                    std::thread::sleep(hl_core::LOCK_POLL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for DbLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::error!("could not release lock {}: {}", self.path.display(), e);
        }
    }
}

/// Materializer in-progress marker, `dashboard_materialize.lock` next to
/// the analytic database. Non-blocking: when already held, callers report
/// a "materializing" status instead of spawning a second builder.
pub struct BuildLock {
    path: PathBuf,
}

impl BuildLock {
    pub fn lock_path(analytic_db: &Path) -> PathBuf {
        analytic_db.with_file_name("dashboard_materialize.lock")
    }

    /// True while some process is building the summaries.
    pub fn is_held(analytic_db: &Path) -> bool {
        Self::lock_path(analytic_db).exists()
    }

    /// Returns `None` when another builder already holds the lock.
    pub fn try_acquire(analytic_db: &Path) -> anyhow::Result<Option<Self>> {
        let path = Self::lock_path(analytic_db);
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(_) => Ok(Some(Self { path })),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::error!("could not release lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_lock_blocks_second_acquire_until_drop() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("heavy_analysis.db");
        let lock = DbLock::acquire(&db).unwrap();
        assert!(DbLock::lock_path(&db).exists());
        drop(lock);
        assert!(!DbLock::lock_path(&db).exists());
        let again = DbLock::acquire(&db).unwrap();
        drop(again);
    }

    #[test]
    fn build_lock_is_single_holder() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("heavy_analysis.db");
        let first = BuildLock::try_acquire(&db).unwrap();
        assert!(first.is_some());
        assert!(BuildLock::is_held(&db));
        assert!(BuildLock::try_acquire(&db).unwrap().is_none());
        drop(first);
        assert!(!BuildLock::is_held(&db));
    }
}
