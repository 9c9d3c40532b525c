//! Append-only primary store: raw hand JSON plus ingest-time sidecars.
use std::path::Path;

use hl_core::Seq;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS hands(
    id        TEXT PRIMARY KEY,
    hand_date TEXT,
    seq       INTEGER,
    raw_json  TEXT,
    chip_value REAL
);
CREATE INDEX IF NOT EXISTS idx_date ON hands(hand_date);
CREATE INDEX IF NOT EXISTS idx_seq  ON hands(hand_date, seq);
CREATE TABLE IF NOT EXISTS hand_meta(
    id TEXT PRIMARY KEY,
    hand_date TEXT,
    is_cash INTEGER,
    is_mtt  INTEGER,
    blinds_bb REAL,
    pot_type TEXT,
    eff_stack_bb REAL,
    chip_bb REAL,
    has_partial_scores INTEGER
);
CREATE TABLE IF NOT EXISTS partial_scores(
    id   TEXT PRIMARY KEY,
    json TEXT,
    FOREIGN KEY(id) REFERENCES hands(id)
);
";

/// One raw hand as ingested.
#[derive(Debug, Clone)]
pub struct HandRow {
    pub id: String,
    pub hand_date: String,
    pub seq: Seq,
    pub raw_json: String,
    pub chip_value: Option<f64>,
}

/// Ingest-time metadata, 1:1 with [`HandRow`].
#[derive(Debug, Clone)]
pub struct MetaRow {
    pub id: String,
    pub hand_date: String,
    pub is_cash: bool,
    pub is_mtt: bool,
    pub blinds_bb: Option<f64>,
    pub pot_type: Option<String>,
    pub eff_stack_bb: Option<f64>,
    pub chip_bb: Option<f64>,
    pub has_partial_scores: bool,
}

/// A raw hand read back for derivation.
pub struct RawHand {
    pub id: String,
    pub hand_date: Option<String>,
    pub seq: Option<Seq>,
    pub raw_json: String,
    pub chip_value: Option<f64>,
}

/// Handle on `poker.db`. Hands are inserted once and never mutated.
pub struct Primary {
    conn: rusqlite::Connection,
}

impl Primary {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = rusqlite::Connection::open(path)?;
        super::tune(&conn)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &rusqlite::Connection {
        &self.conn
    }

    /// Inserts a batch with insert-or-ignore semantics keyed on hand id.
    /// Returns the number of rows actually inserted; duplicates are skipped
    /// silently.
    pub fn insert_hands(&mut self, batch: &[HandRow]) -> anyhow::Result<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO hands(id, hand_date, seq, raw_json, chip_value)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for row in batch {
                inserted += stmt.execute(rusqlite::params![
                    row.id,
                    row.hand_date,
                    row.seq,
                    row.raw_json,
                    row.chip_value,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn insert_meta(&mut self, batch: &[MetaRow]) -> anyhow::Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO hand_meta VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for row in batch {
                stmt.execute(rusqlite::params![
                    row.id,
                    row.hand_date,
                    row.is_cash as i64,
                    row.is_mtt as i64,
                    row.blinds_bb,
                    row.pot_type,
                    row.eff_stack_bb,
                    row.chip_bb,
                    row.has_partial_scores as i64,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Persists solver partial-score JSON blobs keyed by hand id.
    pub fn insert_partial_scores(&mut self, batch: &[(String, String)]) -> anyhow::Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt =
                tx.prepare_cached("INSERT OR IGNORE INTO partial_scores VALUES (?1, ?2)")?;
            for (id, json) in batch {
                stmt.execute(rusqlite::params![id, json])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn exists(&self, hand_id: &str) -> anyhow::Result<bool> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT 1 FROM hands WHERE id = ?1")?;
        Ok(stmt.exists([hand_id])?)
    }

    /// All raw hands whose id is not in `done`, in insertion order. The
    /// filter runs client-side so callers can pass arbitrarily large sets.
    pub fn raw_hands_excluding(
        &self,
        done: &std::collections::HashSet<String>,
    ) -> anyhow::Result<Vec<RawHand>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, hand_date, seq, raw_json, chip_value FROM hands ORDER BY hand_date, seq",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(RawHand {
                    id: row.get(0)?,
                    hand_date: row.get(1)?,
                    seq: row.get(2)?,
                    raw_json: row.get(3)?,
                    chip_value: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().filter(|h| !done.contains(&h.id)).collect())
    }

    /// Partial-score JSON per hand id, for the hand builder's cache.
    pub fn partial_scores(&self) -> anyhow::Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare("SELECT id, json FROM partial_scores")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count(&self) -> anyhow::Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM hands", [], |r| r.get(0))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hand(id: &str) -> HandRow {
        HandRow {
            id: id.into(),
            hand_date: "2025-01-10".into(),
            seq: 0,
            raw_json: "{}".into(),
            chip_value: None,
        }
    }

    #[test]
    fn insert_or_ignore_dedupes_within_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Primary::open(&dir.path().join("poker.db")).unwrap();
        let inserted = store
            .insert_hands(&[hand("A"), hand("B"), hand("A")])
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn insert_or_ignore_dedupes_across_batches() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Primary::open(&dir.path().join("poker.db")).unwrap();
        assert_eq!(store.insert_hands(&[hand("A")]).unwrap(), 1);
        assert_eq!(store.insert_hands(&[hand("A")]).unwrap(), 0);
        assert!(store.exists("A").unwrap());
        assert!(!store.exists("Z").unwrap());
    }

    #[test]
    fn raw_hands_excluding_filters_done() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Primary::open(&dir.path().join("poker.db")).unwrap();
        store.insert_hands(&[hand("A"), hand("B")]).unwrap();
        let done = std::collections::HashSet::from(["A".to_string()]);
        let rest = store.raw_hands_excluding(&done).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, "B");
    }
}
