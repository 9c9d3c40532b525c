//! Daily database rotation into the archive directory.
use std::path::PathBuf;

use hl_core::Paths;

/// Moves both live databases into `archive/{date}/` and re-creates empty
/// files for the next day. An existing archive for the date is never
/// overwritten. Failures are logged, not fatal: rotation must not kill the
/// scraping loop.
pub fn rotate(paths: &Paths, date: &str) -> anyhow::Result<()> {
    let dst = paths.archive_subdir(date)?;
    for db in [paths.poker_db(), paths.heavy_db()] {
        if !db.exists() {
            continue;
        }
        let target = dst.join(db.file_name().unwrap_or_default());
        if target.exists() {
            log::warn!("archive already present, skipping: {}", target.display());
            continue;
        }
        match std::fs::rename(&db, &target) {
            Ok(()) => {
                // fresh empty database for the coming day
                rusqlite::Connection::open(&db)?;
                log::info!("archived {} -> {}", db.display(), target.display());
            }
            Err(e) => log::error!("could not rotate {}: {}", db.display(), e),
        }
    }
    Ok(())
}

/// Resolves the database pair serving a given date: the archived copies
/// when they exist, the live databases otherwise.
pub fn db_paths_for_date(paths: &Paths, date: &str) -> (PathBuf, PathBuf) {
    let sub = paths.archive_dir().join(date);
    let poker = sub.join("poker.db");
    let heavy = sub.join("heavy_analysis.db");
    (
        if poker.exists() { poker } else { paths.poker_db() },
        if heavy.exists() { heavy } else { paths.heavy_db() },
    )
}

/// Dates with at least one archived database, ascending.
pub fn archived_dates(paths: &Paths) -> anyhow::Result<Vec<String>> {
    let mut dates = Vec::new();
    for entry in std::fs::read_dir(paths.archive_dir())? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dates.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    dates.sort();
    Ok(dates)
}

/// Row counts per table across both stores, for startup reporting.
pub fn report(paths: &Paths) -> anyhow::Result<Vec<(String, String, i64)>> {
    let mut out = Vec::new();
    for db in [paths.poker_db(), paths.heavy_db()] {
        if !db.exists() {
            continue;
        }
        let conn = rusqlite::Connection::open_with_flags(
            &db,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        )?;
        let tables = {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
            )?;
            stmt.query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?
        };
        let file = db.file_name().unwrap_or_default().to_string_lossy().into_owned();
        for table in tables {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |r| {
                    r.get(0)
                })?;
            out.push((file.clone(), table, count));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_moves_and_recreates() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::at(dir.path().to_path_buf()).unwrap();
        rusqlite::Connection::open(paths.poker_db()).unwrap();
        rusqlite::Connection::open(paths.heavy_db()).unwrap();
        rotate(&paths, "2025-01-10").unwrap();
        assert!(paths.archive_dir().join("2025-01-10/poker.db").exists());
        assert!(paths.poker_db().exists());
        assert_eq!(archived_dates(&paths).unwrap(), vec!["2025-01-10"]);
        let (p, _) = db_paths_for_date(&paths, "2025-01-10");
        assert!(p.ends_with("archive/2025-01-10/poker.db"));
        let (p, _) = db_paths_for_date(&paths, "2025-01-11");
        assert_eq!(p, paths.poker_db());
    }
}
