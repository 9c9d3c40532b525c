//! Read-only access to the prebuilt preflop range database.
//!
//! The reference table `ranges_flat` holds
//! `(action_sequence, position, combo, action, frequency)` rows indexed by
//! `(combo, position, action_sequence)`.
use std::path::Path;

use hl_core::Frequency;

/// Result of one node lookup: the frequency of the played action and the
/// maximum frequency at the node. Both absent when the node is missing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NodeLookup {
    pub freq: Option<Frequency>,
    pub max: Option<Frequency>,
}

impl NodeLookup {
    /// True when the node exists in the reference at all.
    pub fn found(&self) -> bool {
        self.max.is_some()
    }
}

/// Handle on the solver reference database.
pub struct Ranges {
    conn: rusqlite::Connection,
}

impl Ranges {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        anyhow::ensure!(path.exists(), "ranges database missing: {}", path.display());
        let conn = rusqlite::Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        )?;
        Ok(Self { conn })
    }

    /// Fetches the played action's frequency and the node max in one query.
    ///
    /// `positions` carries the seat aliases (UTG also matches LJ),
    /// `pattern` the LIKE pattern over the compressed action sequence, and
    /// `action` the played token. Raises match any stored raise size,
    /// preferring the smallest.
    pub fn node(
        &self,
        combo: &str,
        positions: &[&str],
        pattern: &str,
        action: &str,
    ) -> anyhow::Result<NodeLookup> {
        let marks = positions
            .iter()
            .map(|_| "?")
            .collect::<Vec<_>>()
            .join(",");
        let sql = if action.starts_with('r') {
            format!(
                "SELECT frequency,
                        (SELECT MAX(frequency) FROM ranges_flat
                         WHERE position IN ({ph}) AND action_sequence LIKE ? AND combo = ?)
                 FROM ranges_flat
                 WHERE position IN ({ph}) AND action_sequence LIKE ? AND combo = ?
                   AND action LIKE 'r%'
                 ORDER BY CAST(SUBSTR(action, 2) AS REAL) LIMIT 1",
                ph = marks
            )
        } else {
            format!(
                "SELECT frequency,
                        (SELECT MAX(frequency) FROM ranges_flat
                         WHERE position IN ({ph}) AND action_sequence LIKE ? AND combo = ?)
                 FROM ranges_flat
                 WHERE position IN ({ph}) AND action_sequence LIKE ? AND combo = ?
                   AND action = ?",
                ph = marks
            )
        };
        let mut params: Vec<&dyn rusqlite::ToSql> = Vec::new();
        for pos in positions {
            params.push(pos);
        }
        params.push(&pattern);
        params.push(&combo);
        for pos in positions {
            params.push(pos);
        }
        params.push(&pattern);
        params.push(&combo);
        if !action.starts_with('r') {
            params.push(&action);
        }
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let row = stmt
            .query_row(params.as_slice(), |row| {
                Ok((
                    row.get::<_, Option<f64>>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                ))
            })
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        match row {
            Some((freq, max)) => Ok(NodeLookup { freq, max }),
            // the played action has no row: the node may still exist
            None => {
                let mut params: Vec<&dyn rusqlite::ToSql> = Vec::new();
                for pos in positions {
                    params.push(pos);
                }
                params.push(&pattern);
                params.push(&combo);
                let sql = format!(
                    "SELECT MAX(frequency) FROM ranges_flat
                     WHERE position IN ({}) AND action_sequence LIKE ? AND combo = ?",
                    marks
                );
                let max: Option<f64> =
                    self.conn
                        .query_row(&sql, params.as_slice(), |row| row.get(0))?;
                Ok(NodeLookup { freq: None, max })
            }
        }
    }
}
