//! Stage 2: match preflop actions against the prebuilt range database.
//!
//! For each 6-handed hand not yet scored, the first preflop action of every
//! position is looked up at its solver node. The result row records the
//! played action's frequency and whether it was among the node's best
//! actions:
//!
//! - `freq = NULL` — the node is absent from the reference
//! - `freq = 0`    — the node exists but the played action has no mass
//! - `best = 'y'`  — the frequency ties the node max within tolerance
use std::collections::HashSet;

use hl_cards::canonical_cards;
use hl_cards::clean_cards;
use hl_cards::hand_key;
use hl_store::NodeLookup;

use crate::situation;
use crate::Context;
use crate::Stage;

pub struct PreflopMatcher;

/// Seat aliases for reference lookups: the solver stores the first seat of
/// a 6-max table as either UTG or LJ.
fn pos_variants(pos: &str) -> Vec<&'static str> {
    match pos {
        "UTG" | "LJ" => vec!["LJ", "UTG"],
        "HJ" => vec!["HJ"],
        "CO" => vec!["CO"],
        "BTN" => vec!["BTN"],
        "SB" => vec!["SB"],
        "BB" => vec!["BB"],
        _ => vec![],
    }
}

struct ScoreRow {
    hand_id: String,
    position: String,
    player: String,
    combo: String,
    seq: String,
    freq: Option<f64>,
    best: Option<&'static str>,
}

fn flush(conn: &mut rusqlite::Connection, batch: &mut Vec<ScoreRow>) -> anyhow::Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT OR IGNORE INTO preflop_scores
             (hand_id, position, player, combo, seq, freq, best)
             VALUES (?1,?2,?3,?4,?5,?6,?7)",
        )?;
        for row in batch.iter() {
            stmt.execute(rusqlite::params![
                row.hand_id,
                row.position,
                row.player,
                row.combo,
                row.seq,
                row.freq,
                row.best,
            ])?;
        }
    }
    tx.commit()?;
    batch.clear();
    Ok(())
}

impl Stage for PreflopMatcher {
    fn name(&self) -> &'static str {
        "preflop"
    }

    fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        let ranges = hl_store::Ranges::open(&ctx.ranges_db)?;
        let mut analytic = hl_store::Analytic::open(&ctx.heavy_db)?;

        let done: HashSet<String> = {
            let conn = analytic.connection();
            let mut stmt = conn.prepare("SELECT DISTINCT hand_id FROM preflop_scores")?;
            stmt.query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<_, _>>()?
        };
        let hands: Vec<String> = {
            let conn = analytic.connection();
            let mut stmt =
                conn.prepare("SELECT hand_id FROM hand_info WHERE players_cnt = 6")?;
            stmt.query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<String>, _>>()?
                .into_iter()
                .filter(|id| !done.contains(id))
                .collect()
        };

        let mut batch: Vec<ScoreRow> = Vec::new();
        let mut processed = 0usize;
        for hand_id in hands {
            let rows: Vec<(String, String, String, String, String)> = {
                let mut stmt = analytic.connection().prepare_cached(
                    "SELECT position, nickname, action, amount_to, state_prefix, holecards
                     FROM actions WHERE hand_id = ?1 AND street = 'preflop'
                     ORDER BY action_order",
                )?;
                stmt.query_map([&hand_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        format!(
                            "{}{}",
                            row.get::<_, String>(2)?,
                            match row.get::<_, i64>(3)? {
                                0 => String::new(),
                                amount => amount.to_string(),
                            }
                        ),
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                })?
                .collect::<Result<_, _>>()?
            };
            let mut seen: HashSet<String> = HashSet::new();
            for (position, nickname, action, state_prefix, holecards) in rows {
                // one row per position: the first voluntary decision
                if !seen.insert(position.clone()) {
                    continue;
                }
                let mut history = situation::tokenize(&state_prefix)?;
                situation::compress_trailing_folds(&mut history);
                let seq = situation::to_seq(&history);
                let pattern = situation::like_pattern(&seq);
                let cleaned = clean_cards(&holecards);
                let combo = canonical_cards(&cleaned);
                let key = hand_key(&cleaned);
                let variants = pos_variants(&position);
                if variants.is_empty() || combo.is_empty() {
                    batch.push(ScoreRow {
                        hand_id: hand_id.clone(),
                        position,
                        player: nickname,
                        combo,
                        seq,
                        freq: None,
                        best: None,
                    });
                    continue;
                }
                // the reference may key combos as "AKs" or as exact cards
                let mut lookup = NodeLookup::default();
                for candidate in [key.as_str(), combo.as_str()] {
                    lookup = ranges.node(candidate, &variants, &pattern, &action)?;
                    if lookup.found() {
                        break;
                    }
                }
                let freq = match (lookup.freq, lookup.max) {
                    (Some(f), _) => Some(f),
                    (None, Some(_)) => Some(0.0),
                    (None, None) => None,
                };
                let best = match (freq, lookup.max) {
                    (Some(f), Some(m)) if (f - m).abs() <= hl_core::FREQ_TOLERANCE => Some("y"),
                    (_, Some(_)) => Some("n"),
                    _ => None,
                };
                batch.push(ScoreRow {
                    hand_id: hand_id.clone(),
                    position,
                    player: nickname,
                    combo,
                    seq,
                    freq,
                    best,
                });
            }
            processed += 1;
            if batch.len() >= hl_core::PREFLOP_BATCH_ROWS {
                flush(analytic.connection_mut(), &mut batch)?;
                log::info!("{} hands matched so far", processed);
            }
        }
        flush(analytic.connection_mut(), &mut batch)?;
        log::info!("preflop matcher: {} hands processed", processed);
        Ok(())
    }
}
