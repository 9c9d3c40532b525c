//! Stage 7: join stored preflop/postflop score rows back onto actions.
//!
//! Hand ids differ between sources only by a `Hand` prefix, so joins try
//! the raw id plus both prefix variants. Postflop nodes match exactly
//! first, then by suffix (stored node carries extra leading history), then
//! by prefix (stored node is a truncation).
use std::collections::HashMap;
use std::collections::HashSet;

use crate::Context;
use crate::Stage;

pub struct ScoreJoiner;

const POSTFLOP_CHUNK: usize = 10_000;

fn bare(id: &str) -> &str {
    id.strip_prefix("Hand").unwrap_or(id)
}

fn prefixed(id: &str) -> String {
    if id.starts_with("Hand") {
        id.to_string()
    } else {
        format!("Hand{}", id)
    }
}

fn variants(id: &str) -> [String; 3] {
    [id.to_string(), bare(id).to_string(), prefixed(id)]
}

fn node_for(prefix: &str, action: &str, amount_to: i64) -> String {
    if action == "r" && amount_to != 0 {
        format!("{}r{}", prefix, amount_to)
    } else {
        format!("{}{}", prefix, action)
    }
}

fn join_preflop(conn: &mut rusqlite::Connection) -> anyhow::Result<usize> {
    let actions: Vec<(i64, String, String)> = {
        let mut stmt = conn.prepare(
            "SELECT rowid, hand_id, position FROM actions
             WHERE street = 'preflop' AND preflop_score IS NULL
               AND action IN ('r', 'c', 'f')",
        )?;
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<_, _>>()?
    };
    if actions.is_empty() {
        return Ok(0);
    }
    let mut scores: HashMap<(String, String), (f64, Option<String>)> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT hand_id, position, freq, best FROM preflop_scores WHERE freq IS NOT NULL",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;
        for row in rows {
            let (hand_id, position, freq, best) = row?;
            for variant in variants(&hand_id) {
                scores.insert((variant, position.clone()), (freq, best.clone()));
            }
        }
    }
    let mut updates = Vec::new();
    for (rowid, hand_id, position) in actions {
        let hit = variants(&hand_id)
            .into_iter()
            .find_map(|v| scores.get(&(v, position.clone())).cloned());
        if let Some((freq, best)) = hit {
            updates.push((freq, best, rowid));
        }
    }
    let applied = updates.len();
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached(
            "UPDATE actions SET preflop_score = ?1, solver_best = ?2 WHERE rowid = ?3",
        )?;
        for (freq, best, rowid) in &updates {
            stmt.execute(rusqlite::params![freq, best, rowid])?;
        }
    }
    tx.commit()?;
    Ok(applied)
}

/// One pass over postflop rows still missing a score, bounded to hands
/// that actually have stored node scores. Returns rows updated; the caller
/// loops until a pass makes no progress.
fn join_postflop(conn: &mut rusqlite::Connection) -> anyhow::Result<usize> {
    let actions: Vec<(i64, String, String, String, i64)> = {
        let mut stmt = conn.prepare(
            "SELECT a.rowid, a.hand_id, a.state_prefix, a.action, a.amount_to
             FROM actions a
             WHERE a.street != 'preflop' AND a.postflop_score IS NULL
               AND a.action IN ('r', 'c', 'f', 'x')
               AND EXISTS (SELECT 1 FROM postflop_scores ps WHERE ps.hand_id = a.hand_id)
             LIMIT ?1",
        )?;
        stmt.query_map([POSTFLOP_CHUNK as i64], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            ))
        })?
        .collect::<Result<_, _>>()?
    };
    if actions.is_empty() {
        return Ok(0);
    }
    let wanted_hands: HashSet<String> = actions
        .iter()
        .flat_map(|(_, id, _, _, _)| variants(id))
        .collect();
    // node scores per id variant
    let mut nodes: HashMap<String, Vec<(String, f64)>> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT hand_id, node_string, action_score
             FROM postflop_scores WHERE action_score IS NOT NULL",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?;
        for row in rows {
            let (hand_id, node, score) = row?;
            for variant in variants(&hand_id) {
                if wanted_hands.contains(&variant) {
                    nodes
                        .entry(variant)
                        .or_default()
                        .push((node.clone(), score));
                }
            }
        }
    }
    let mut updates = Vec::new();
    for (rowid, hand_id, state_prefix, action, amount_to) in actions {
        let expected = node_for(&state_prefix, &action, amount_to);
        let candidates = variants(&hand_id);
        let hand_nodes = candidates.iter().find_map(|v| nodes.get(v));
        let Some(hand_nodes) = hand_nodes else {
            continue;
        };
        let hit = hand_nodes
            .iter()
            .find(|(node, _)| *node == expected)
            .or_else(|| hand_nodes.iter().find(|(node, _)| node.ends_with(&expected)))
            .or_else(|| {
                hand_nodes
                    .iter()
                    .find(|(node, _)| expected.starts_with(node.as_str()))
            });
        if let Some((_, score)) = hit {
            updates.push((*score, rowid));
        }
    }
    let applied = updates.len();
    let tx = conn.transaction()?;
    {
        let mut stmt =
            tx.prepare_cached("UPDATE actions SET postflop_score = ?1 WHERE rowid = ?2")?;
        for (score, rowid) in &updates {
            stmt.execute(rusqlite::params![score, rowid])?;
        }
    }
    tx.commit()?;
    Ok(applied)
}

/// Multiplies a score column by 100 when its values still sit on the 0-1
/// scale, so both joined columns end up on 0-100.
fn rescale(conn: &rusqlite::Connection, column: &str) -> anyhow::Result<usize> {
    let max: Option<f64> = conn.query_row(
        &format!("SELECT MAX({col}) FROM actions WHERE {col} IS NOT NULL", col = column),
        [],
        |row| row.get(0),
    )?;
    match max {
        Some(m) if m <= 1.0 => {
            let n = conn.execute(
                &format!(
                    "UPDATE actions SET {col} = {col} * 100 WHERE {col} IS NOT NULL",
                    col = column
                ),
                [],
            )?;
            log::info!("rescaled {} {} values onto 0-100", n, column);
            Ok(n)
        }
        _ => Ok(0),
    }
}

impl Stage for ScoreJoiner {
    fn name(&self) -> &'static str {
        "joiner"
    }

    fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        let mut analytic = hl_store::Analytic::open(&ctx.heavy_db)?;
        analytic.ensure_indexes()?;
        let preflop = join_preflop(analytic.connection_mut())?;
        log::info!("score joiner: {} preflop actions joined", preflop);
        let mut postflop = 0usize;
        loop {
            let updated = join_postflop(analytic.connection_mut())?;
            if updated == 0 {
                break;
            }
            postflop += updated;
        }
        log::info!("score joiner: {} postflop actions joined", postflop);
        if ctx.normalize_scores {
            rescale(analytic.connection(), "preflop_score")?;
            rescale(analytic.connection(), "postflop_score")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert_action(
        conn: &rusqlite::Connection,
        hand_id: &str,
        order: i64,
        street: &str,
        position: &str,
        action: &str,
        amount_to: i64,
        state_prefix: &str,
    ) {
        conn.execute(
            "INSERT INTO actions (hand_id, action_order, street, street_index, position,
             player_id, nickname, action, amount_to, stack_before, stack_after,
             invested_this_action, pot_before, pot_after, players_left, is_allin,
             state_prefix, board_cards, holecards)
             VALUES (?1, ?2, ?3, 0, ?4, 'p', 'p', ?5, ?6, 0, 0, 0, 0, 0, 2, 0, ?7, '', '')",
            rusqlite::params![hand_id, order, street, position, action, amount_to, state_prefix],
        )
        .unwrap();
    }

    fn ctx(dir: &std::path::Path, normalize: bool) -> Context {
        Context {
            poker_db: dir.join("poker.db"),
            heavy_db: dir.join("heavy_analysis.db"),
            ranges_db: dir.join("ranges.db"),
            normalize_cur: false,
            normalize_scores: normalize,
            rules: crate::rules::LabelRules::fallback(),
            intentions: crate::intentions::IntentionBook::empty(),
        }
    }

    #[test]
    fn preflop_join_bridges_hand_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path(), false);
        {
            let analytic = hl_store::Analytic::open(&ctx.heavy_db).unwrap();
            let conn = analytic.connection();
            insert_action(conn, "Hand249", 0, "preflop", "BTN", "r", 250, "");
            conn.execute(
                "INSERT INTO preflop_scores VALUES ('249', 'BTN', 'bob', 'AsKh', '', 0.8, 'y')",
                [],
            )
            .unwrap();
        }
        ScoreJoiner.run(&ctx).unwrap();
        let conn = rusqlite::Connection::open(&ctx.heavy_db).unwrap();
        let (score, best): (f64, String) = conn
            .query_row(
                "SELECT preflop_score, solver_best FROM actions WHERE hand_id = 'Hand249'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert!((score - 0.8).abs() < 1e-12);
        assert_eq!(best, "y");
    }

    #[test]
    fn postflop_join_exact_suffix_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path(), false);
        {
            let analytic = hl_store::Analytic::open(&ctx.heavy_db).unwrap();
            let conn = analytic.connection();
            // exact: stored node equals prefix + r-amount
            insert_action(conn, "H1", 0, "flop", "BTN", "r", 550, "rrcc[AhKsQd]x");
            // suffix: stored node carries more leading history
            insert_action(conn, "H1", 1, "flop", "SB", "c", 0, "[AhKsQd]xr550");
            // prefix: stored node is truncated
            insert_action(conn, "H1", 2, "turn", "BTN", "x", 0, "rrcc[AhKsQd]xr550c[2c]");
            for (node, score) in [
                ("rrcc[AhKsQd]xr550", 0.71),
                ("rrcc[AhKsQd]xr550c", 0.42),
                ("rrcc[AhKsQd]xr550c[2c]", 0.33),
            ] {
                conn.execute(
                    "INSERT INTO postflop_scores VALUES ('H1', ?1, ?2, NULL)",
                    rusqlite::params![node, score],
                )
                .unwrap();
            }
        }
        ScoreJoiner.run(&ctx).unwrap();
        let conn = rusqlite::Connection::open(&ctx.heavy_db).unwrap();
        let scores: Vec<Option<f64>> = conn
            .prepare("SELECT postflop_score FROM actions ORDER BY action_order")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(scores[0], Some(0.71));
        assert_eq!(scores[1], Some(0.42));
        assert_eq!(scores[2], Some(0.33));
    }

    #[test]
    fn normalize_rescales_unit_scores() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path(), true);
        {
            let analytic = hl_store::Analytic::open(&ctx.heavy_db).unwrap();
            let conn = analytic.connection();
            insert_action(conn, "H1", 0, "preflop", "BTN", "r", 250, "");
            conn.execute(
                "INSERT INTO preflop_scores VALUES ('H1', 'BTN', 'bob', 'AsKh', '', 0.8, 'y')",
                [],
            )
            .unwrap();
        }
        ScoreJoiner.run(&ctx).unwrap();
        let conn = rusqlite::Connection::open(&ctx.heavy_db).unwrap();
        let score: f64 = conn
            .query_row("SELECT preflop_score FROM actions", [], |r| r.get(0))
            .unwrap();
        assert!((score - 80.0).abs() < 1e-9);
    }
}
