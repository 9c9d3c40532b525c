//! Read-only query API over the analytic store.
//!
//! This is the contract the HTTP layer consumes: dashboards, leaderboards,
//! hand searches, and segmented comparisons, answered without schema
//! changes. Rows come back as JSON objects so the serving layer can pass
//! them through unchanged. The API never writes; materialized tables are
//! preferred and live aggregation is the fallback while they are missing.
use std::collections::HashMap;
use std::path::Path;

use serde_json::json;
use serde_json::Value;

/// Readiness of the analytic store as reported to health checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Summaries exist and actions are populated.
    Ready,
    /// A materializer currently holds the build lock.
    Materializing,
    /// Store missing, empty, or not yet summarized.
    NotReady,
}

/// Read-only handle on the analytic store.
pub struct API {
    conn: rusqlite::Connection,
    path: std::path::PathBuf,
}

fn row_to_json(row: &rusqlite::Row, columns: &[String]) -> rusqlite::Result<Value> {
    let mut obj = serde_json::Map::new();
    for (i, name) in columns.iter().enumerate() {
        let value = match row.get_ref(i)? {
            rusqlite::types::ValueRef::Null => Value::Null,
            rusqlite::types::ValueRef::Integer(n) => json!(n),
            rusqlite::types::ValueRef::Real(f) => json!(f),
            rusqlite::types::ValueRef::Text(t) => json!(String::from_utf8_lossy(t)),
            rusqlite::types::ValueRef::Blob(_) => Value::Null,
        };
        obj.insert(name.clone(), value);
    }
    Ok(Value::Object(obj))
}

impl API {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = rusqlite::Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        )?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    fn query(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> anyhow::Result<Vec<Value>> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let rows = stmt
            .query_map(params, |row| row_to_json(row, &columns))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn table_exists(&self, name: &str) -> bool {
        self.conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |_| Ok(()),
            )
            .is_ok()
    }
}

// readiness
impl API {
    /// One-row check the health endpoint exposes as `database_ready`:
    /// `dashboard_summary` has a row and `actions` is non-empty.
    pub fn is_ready(&self) -> bool {
        self.readiness() == Readiness::Ready
    }

    pub fn readiness(&self) -> Readiness {
        if hl_store::BuildLock::is_held(&self.path) {
            return Readiness::Materializing;
        }
        if !self.table_exists("dashboard_summary") || !self.table_exists("actions") {
            return Readiness::NotReady;
        }
        let summarized: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM dashboard_summary", [], |r| r.get(0))
            .unwrap_or(0);
        let actions: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM actions LIMIT 1", [], |r| r.get(0))
            .unwrap_or(0);
        if summarized == 1 && actions > 0 {
            Readiness::Ready
        } else {
            Readiness::NotReady
        }
    }
}

// dashboard + leaderboards
impl API {
    /// The single materialized dashboard row.
    pub fn dashboard_summary(&self) -> anyhow::Result<Option<Value>> {
        if !self.table_exists("dashboard_summary") {
            return Ok(None);
        }
        Ok(self
            .query("SELECT * FROM dashboard_summary", &[])?
            .into_iter()
            .next())
    }

    /// Top players by hand count with score averages. Prefers the
    /// materialized table; aggregates live while it is missing.
    pub fn top_players(&self, limit: i64) -> anyhow::Result<Vec<Value>> {
        if self.table_exists("top25_players") {
            return self.query(
                "SELECT * FROM top25_players ORDER BY total_hands DESC LIMIT ?1",
                &[&limit],
            );
        }
        self.query(
            "SELECT
                 player_id,
                 nickname,
                 COUNT(DISTINCT hand_id)  AS total_hands,
                 ROUND(AVG(j_score), 1)   AS avg_j_score,
                 ROUND(SUM(CASE WHEN action != 'f' AND street = 'preflop' THEN 1 ELSE 0 END) * 100.0 /
                       NULLIF(SUM(CASE WHEN street = 'preflop' THEN 1 ELSE 0 END), 0), 1) AS vpip,
                 ROUND(SUM(CASE WHEN action = 'r' AND street = 'preflop' THEN 1 ELSE 0 END) * 100.0 /
                       NULLIF(SUM(CASE WHEN street = 'preflop' THEN 1 ELSE 0 END), 0), 1) AS pfr
             FROM actions
             WHERE player_id IS NOT NULL AND player_id != ''
             GROUP BY player_id, nickname
             HAVING COUNT(DISTINCT hand_id) > 10
             ORDER BY total_hands DESC
             LIMIT ?1",
            &[&limit],
        )
    }

    /// One player's summary row, live fallback included.
    pub fn player_stats(&self, player_id: &str) -> anyhow::Result<Option<Value>> {
        if self.table_exists("player_summary") {
            let rows = self.query(
                "SELECT * FROM player_summary WHERE player_id = ?1",
                &[&player_id],
            )?;
            if let Some(row) = rows.into_iter().next() {
                return Ok(Some(row));
            }
        }
        Ok(self
            .query(
                "SELECT
                     player_id,
                     nickname,
                     COUNT(DISTINCT hand_id) AS hands_played,
                     COUNT(action_order)     AS total_actions,
                     ROUND(AVG(j_score), 1)  AS avg_j_score
                 FROM actions
                 WHERE player_id = ?1
                 GROUP BY player_id, nickname",
                &[&player_id],
            )?
            .into_iter()
            .next())
    }
}

// hand history
impl API {
    /// Most recent hands a player took part in.
    pub fn recent_hands(&self, player_id: &str, limit: i64) -> anyhow::Result<Vec<Value>> {
        self.query(
            "SELECT
                 h.hand_id,
                 h.hand_date,
                 h.pot_type,
                 h.big_blind,
                 MAX(a.pot_after)  AS final_pot,
                 p.position,
                 p.holecards,
                 p.money_won
             FROM hand_info h
             JOIN actions a ON a.hand_id = h.hand_id AND a.player_id = ?1
             LEFT JOIN players p ON p.hand_id = h.hand_id AND p.position = a.position
             GROUP BY h.hand_id
             ORDER BY h.hand_date DESC, h.seq DESC
             LIMIT ?2",
            &[&player_id, &limit],
        )
    }

    /// Every action row of one hand, in order.
    pub fn hand_detail(&self, hand_id: &str) -> anyhow::Result<Vec<Value>> {
        self.query(
            "SELECT action_order, street, position, nickname, action, amount_to,
                    invested_this_action, pot_before, pot_after, players_left,
                    action_label, ip_status, intention, j_score, size_frac, size_cat,
                    preflop_score, postflop_score, solver_best, board_cards, holecards
             FROM actions WHERE hand_id = ?1 ORDER BY action_order",
            &[&hand_id],
        )
    }

    /// Scatter rows for the betting-size-versus-strength chart.
    pub fn bet_vs_strength(&self, player_id: &str, limit: i64) -> anyhow::Result<Vec<Value>> {
        self.query(
            "SELECT street, action_label, size_frac, size_cat, j_score, intention
             FROM actions
             WHERE player_id = ?1 AND action = 'r'
               AND size_frac IS NOT NULL AND j_score IS NOT NULL
             ORDER BY hand_id, action_order
             LIMIT ?2",
            &[&player_id, &limit],
        )
    }
}

// player comparison
impl API {
    /// Players for the comparison dropdown, with per-street scores and
    /// action tendencies. `search` filters on id or nickname.
    pub fn search_players(&self, search: &str, limit: i64) -> anyhow::Result<Vec<Value>> {
        let pattern = format!("%{}%", search);
        self.query(
            "SELECT
                 a.player_id,
                 a.nickname,
                 COUNT(DISTINCT a.hand_id) AS hands_played,
                 ROUND(AVG(a.j_score), 1)  AS avg_j_score,
                 ROUND(AVG(CASE WHEN a.action != 'f' AND a.street = 'preflop'
                           THEN 1.0 ELSE 0.0 END) * 100, 1) AS vpip,
                 ROUND(AVG(CASE WHEN a.action = 'r' AND a.street = 'preflop'
                           THEN 1.0 ELSE 0.0 END) * 100, 1) AS pfr,
                 ROUND(AVG(CASE WHEN a.street = 'preflop' THEN a.j_score END), 1) AS preflop_score,
                 ROUND(AVG(CASE WHEN a.street = 'flop'    THEN a.j_score END), 1) AS flop_score,
                 ROUND(AVG(CASE WHEN a.street = 'turn'    THEN a.j_score END), 1) AS turn_score,
                 ROUND(AVG(CASE WHEN a.street = 'river'   THEN a.j_score END), 1) AS river_score,
                 ROUND(AVG(CASE WHEN a.action = 'r' THEN 1.0 ELSE 0.0 END) * 100, 1) AS aggression_freq,
                 ROUND(AVG(CASE WHEN a.action = 'c' THEN 1.0 ELSE 0.0 END) * 100, 1) AS call_freq,
                 ROUND(AVG(CASE WHEN a.action = 'f' THEN 1.0 ELSE 0.0 END) * 100, 1) AS fold_freq,
                 ROUND(AVG(CASE WHEN a.action = 'r' THEN a.size_frac END), 3)  AS avg_raise_size
             FROM actions a
             WHERE a.player_id IS NOT NULL AND a.player_id != ''
               AND (a.player_id LIKE ?1 OR a.nickname LIKE ?1)
             GROUP BY a.player_id, a.nickname
             HAVING hands_played > 20
             ORDER BY hands_played DESC
             LIMIT ?2",
            &[&pattern, &limit],
        )
    }

    /// Side-by-side rows for two players, same breakdown as the search.
    pub fn compare_players(&self, player1: &str, player2: &str) -> anyhow::Result<Vec<Value>> {
        self.query(
            "SELECT
                 a.player_id,
                 a.nickname,
                 COUNT(DISTINCT a.hand_id) AS hands_played,
                 ROUND(AVG(a.j_score), 1)  AS avg_j_score,
                 ROUND(AVG(CASE WHEN a.action != 'f' AND a.street = 'preflop'
                           THEN 1.0 ELSE 0.0 END) * 100, 1) AS vpip,
                 ROUND(AVG(CASE WHEN a.action = 'r' AND a.street = 'preflop'
                           THEN 1.0 ELSE 0.0 END) * 100, 1) AS pfr,
                 ROUND(AVG(CASE WHEN a.street = 'preflop' THEN a.j_score END), 1) AS preflop_score,
                 ROUND(AVG(CASE WHEN a.street = 'flop'    THEN a.j_score END), 1) AS flop_score,
                 ROUND(AVG(CASE WHEN a.street = 'turn'    THEN a.j_score END), 1) AS turn_score,
                 ROUND(AVG(CASE WHEN a.street = 'river'   THEN a.j_score END), 1) AS river_score,
                 ROUND(AVG(CASE WHEN a.action = 'r' THEN a.size_frac END), 3)  AS avg_raise_size
             FROM actions a
             WHERE a.player_id IN (?1, ?2)
             GROUP BY a.player_id, a.nickname
             ORDER BY a.player_id = ?1 DESC",
            &[&player1, &player2],
        )
    }
}

// segmented comparison
impl API {
    /// Filter keys the segment endpoint accepts, mapped to columns. The
    /// allowlist is the injection boundary: unknown keys are ignored.
    const SEGMENT_FILTERS: [(&'static str, &'static str); 6] = [
        ("street", "street"),
        ("action", "action"),
        ("action_label", "action_label"),
        ("ip_status", "ip_status"),
        ("size_cat", "size_cat"),
        ("intention", "intention"),
    ];

    /// Per-player aggregates over the actions selected by the filter map.
    pub fn segment(
        &self,
        filters: &HashMap<String, String>,
        limit: i64,
    ) -> anyhow::Result<Vec<Value>> {
        let mut clauses = vec!["player_id IS NOT NULL AND player_id != ''".to_string()];
        let mut params: Vec<&dyn rusqlite::ToSql> = Vec::new();
        for (key, column) in Self::SEGMENT_FILTERS {
            if let Some(value) = filters.get(key) {
                params.push(value);
                clauses.push(format!("{} = ?{}", column, params.len()));
            }
        }
        params.push(&limit);
        let sql = format!(
            "SELECT
                 player_id,
                 nickname,
                 COUNT(*)                    AS actions,
                 COUNT(DISTINCT hand_id)     AS hands,
                 ROUND(AVG(j_score), 1)      AS avg_j_score,
                 ROUND(AVG(size_frac), 3)    AS avg_size_frac,
                 ROUND(AVG(preflop_score), 1)  AS avg_preflop_score,
                 ROUND(AVG(postflop_score), 1) AS avg_postflop_score
             FROM actions
             WHERE {}
             GROUP BY player_id, nickname
             ORDER BY actions DESC
             LIMIT ?{}",
            clauses.join(" AND "),
            params.len()
        );
        self.query(&sql, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(dir: &Path) -> std::path::PathBuf {
        let heavy = dir.join("heavy_analysis.db");
        let analytic = hl_store::Analytic::open(&heavy).unwrap();
        let conn = analytic.connection();
        conn.execute(
            "INSERT INTO hand_info VALUES ('H1', '2025-01-10', 0, 0, 1, 100, 50, 0, 2, 'SRP')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO players VALUES ('H1', 'BTN', 'bob', 10000, 'As,Kh', 150.0)",
            [],
        )
        .unwrap();
        for (i, (street, act, label)) in [
            ("preflop", "r", "open"),
            ("flop", "r", "cbet"),
            ("river", "c", "call"),
        ]
        .iter()
        .enumerate()
        {
            conn.execute(
                "INSERT INTO actions (hand_id, action_order, street, street_index, position,
                 player_id, nickname, action, amount_to, stack_before, stack_after,
                 invested_this_action, pot_before, pot_after, players_left, is_allin,
                 state_prefix, board_cards, holecards, j_score, action_label, size_frac,
                 ip_status)
                 VALUES ('H1', ?1, ?2, 0, 'BTN', 'p1', 'bob', ?3, 200, 1000, 800, 200,
                         150, 350, 2, 0, '', '', 'As,Kh', 60.0, ?4, 0.5, 'IP')",
                rusqlite::params![i as i64, street, act, label],
            )
            .unwrap();
        }
        heavy
    }

    #[test]
    fn readiness_requires_summary_and_actions() {
        let dir = tempfile::tempdir().unwrap();
        let heavy = seeded(dir.path());
        let api = API::open(&heavy).unwrap();
        assert_eq!(api.readiness(), Readiness::NotReady);
        {
            let conn = rusqlite::Connection::open(&heavy).unwrap();
            conn.execute_batch(
                "CREATE TABLE dashboard_summary AS SELECT COUNT(*) AS total_actions FROM actions",
            )
            .unwrap();
        }
        let api = API::open(&heavy).unwrap();
        assert!(api.is_ready());
    }

    #[test]
    fn materializing_status_wins_while_lock_held() {
        let dir = tempfile::tempdir().unwrap();
        let heavy = seeded(dir.path());
        let _lock = hl_store::BuildLock::try_acquire(&heavy).unwrap().unwrap();
        let api = API::open(&heavy).unwrap();
        assert_eq!(api.readiness(), Readiness::Materializing);
    }

    #[test]
    fn hand_detail_and_scatter_rows() {
        let dir = tempfile::tempdir().unwrap();
        let api = API::open(&seeded(dir.path())).unwrap();
        let detail = api.hand_detail("H1").unwrap();
        assert_eq!(detail.len(), 3);
        assert_eq!(detail[0]["street"], "preflop");
        let scatter = api.bet_vs_strength("p1", 50).unwrap();
        assert_eq!(scatter.len(), 2);
        assert_eq!(scatter[0]["size_frac"], serde_json::json!(0.5));
    }

    #[test]
    fn segment_filters_use_the_allowlist() {
        let dir = tempfile::tempdir().unwrap();
        let api = API::open(&seeded(dir.path())).unwrap();
        let mut filters = HashMap::new();
        filters.insert("street".to_string(), "flop".to_string());
        filters.insert("bogus; DROP TABLE actions".to_string(), "x".to_string());
        let rows = api.segment(&filters, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["actions"], serde_json::json!(1));
    }

    #[test]
    fn top_players_falls_back_without_materialized_table() {
        let dir = tempfile::tempdir().unwrap();
        let api = API::open(&seeded(dir.path())).unwrap();
        // one hand does not clear the >10 hands threshold
        assert!(api.top_players(25).unwrap().is_empty());
    }
}
