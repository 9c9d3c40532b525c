//! Analytic store: normalized tables filled by the pipeline stages and the
//! materialized summaries consumed by the read layer.
//!
//! The full column set is declared up front; enrichment stages only UPDATE
//! their nullable target columns, so every stage can run idempotently.
use std::path::Path;
use std::path::PathBuf;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS hand_info(
    hand_id     TEXT PRIMARY KEY,
    hand_date   TEXT,
    seq         INTEGER,
    is_mtt      INTEGER,
    is_cash     INTEGER,
    big_blind   INTEGER,
    small_blind INTEGER,
    ante        INTEGER,
    players_cnt INTEGER,
    pot_type    TEXT
);
CREATE TABLE IF NOT EXISTS streets(
    hand_id TEXT, street TEXT, board TEXT,
    PRIMARY KEY(hand_id, street)
);
CREATE TABLE IF NOT EXISTS players(
    hand_id TEXT, position TEXT, nickname TEXT,
    stack0 INTEGER, holecards TEXT, money_won REAL,
    PRIMARY KEY(hand_id, position)
);
CREATE TABLE IF NOT EXISTS actions(
    hand_id TEXT, action_order INTEGER,
    street TEXT, street_index INTEGER,
    position TEXT,
    player_id TEXT,
    nickname TEXT,
    action TEXT, amount_to INTEGER,
    stack_before INTEGER, stack_after INTEGER,
    invested_this_action INTEGER,
    pot_before INTEGER, pot_after INTEGER,
    players_left INTEGER, is_allin INTEGER,
    action_score REAL, decision_difficulty REAL,
    state_prefix TEXT,
    board_cards TEXT,
    holecards   TEXT,
    size_frac REAL, size_cat TEXT,
    action_label TEXT, ip_status TEXT,
    j_score REAL, intention TEXT,
    preflop_score REAL, postflop_score REAL, solver_best TEXT,
    PRIMARY KEY(hand_id, action_order)
);
CREATE TABLE IF NOT EXISTS postflop_scores(
    hand_id TEXT, node_string TEXT,
    action_score REAL, decision_difficulty REAL,
    PRIMARY KEY(hand_id, node_string)
);
CREATE TABLE IF NOT EXISTS preflop_scores(
    hand_id  TEXT,
    position TEXT,
    player   TEXT,
    combo    TEXT,
    seq      TEXT,
    freq     REAL,
    best     TEXT,
    PRIMARY KEY (hand_id, position)
);
";

const INDICES: &str = "
CREATE INDEX IF NOT EXISTS idx_actions_hand           ON actions(hand_id);
CREATE INDEX IF NOT EXISTS idx_actions_player         ON actions(player_id);
CREATE INDEX IF NOT EXISTS idx_actions_player_street  ON actions(player_id, street);
CREATE INDEX IF NOT EXISTS idx_actions_player_hand    ON actions(player_id, hand_id);
CREATE INDEX IF NOT EXISTS idx_actions_street_action  ON actions(street, action);
CREATE INDEX IF NOT EXISTS idx_actions_hand_position  ON actions(hand_id, position);
CREATE INDEX IF NOT EXISTS idx_actions_hand_state     ON actions(hand_id, state_prefix, action);
CREATE INDEX IF NOT EXISTS idx_preflop_hand_position  ON preflop_scores(hand_id, position);
CREATE INDEX IF NOT EXISTS idx_postflop_hand_node     ON postflop_scores(hand_id, node_string);
";

/// Handle on `heavy_analysis.db`.
pub struct Analytic {
    path: PathBuf,
    conn: rusqlite::Connection,
}

impl Analytic {
    /// Opens the store, applies pragmas, and ensures schema + indexes.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = rusqlite::Connection::open(path)?;
        super::tune(&conn)?;
        conn.execute_batch(SCHEMA)?;
        conn.execute_batch(INDICES)?;
        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
    pub fn connection(&self) -> &rusqlite::Connection {
        &self.conn
    }
    pub fn connection_mut(&mut self) -> &mut rusqlite::Connection {
        &mut self.conn
    }

    /// Re-runs index creation. Cheap when nothing is missing; called before
    /// every pipeline run.
    pub fn ensure_indexes(&self) -> anyhow::Result<()> {
        self.conn.execute_batch(INDICES)?;
        Ok(())
    }

    /// Hand ids already built by the parser stage.
    pub fn built_hand_ids(&self) -> anyhow::Result<std::collections::HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT hand_id FROM hand_info")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<_, _>>()?;
        Ok(ids)
    }

    pub fn checkpoint(&self) -> anyhow::Result<()> {
        super::checkpoint(&self.conn)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_and_indexes_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heavy_analysis.db");
        let store = Analytic::open(&path).unwrap();
        store.ensure_indexes().unwrap();
        drop(store);
        let again = Analytic::open(&path).unwrap();
        assert!(again.built_hand_ids().unwrap().is_empty());
    }
}
