//! Stage 3: bet-size fraction and category per raise action.
//!
//! Preflop sizes are measured in big blinds (`amount_to / big_blind`),
//! postflop sizes against the pot (`invested / pot_before`). Buckets are
//! half-open `[lo, hi)`.
use crate::Context;
use crate::Stage;

pub struct SizingClassifier;

/// Postflop buckets, fraction of the pot.
const POSTFLOP: [(&str, f64, f64); 7] = [
    ("tiny", 0.01, 0.20),
    ("small", 0.20, 0.35),
    ("medium", 0.35, 0.55),
    ("big", 0.55, 0.85),
    ("pot", 0.85, 1.10),
    ("over", 1.10, 1.75),
    ("huge", 1.75, f64::INFINITY),
];

/// Preflop buckets, number of big blinds.
const PREFLOP: [(&str, f64, f64); 7] = [
    ("tiny", 0.01, 1.50),
    ("small", 1.50, 2.25),
    ("medium", 2.25, 3.00),
    ("big", 3.00, 3.75),
    ("pot", 3.75, 4.50),
    ("over", 4.50, 6.00),
    ("huge", 6.00, f64::INFINITY),
];

/// Bucket label for a fraction on the given street.
pub fn label(frac: f64, street: &str) -> &'static str {
    let table = if street.eq_ignore_ascii_case("preflop") {
        &PREFLOP
    } else {
        &POSTFLOP
    };
    table
        .iter()
        .find(|(_, lo, hi)| *lo <= frac && frac < *hi)
        .map(|(name, _, _)| *name)
        .unwrap_or("unknown")
}

impl Stage for SizingClassifier {
    fn name(&self) -> &'static str {
        "sizing"
    }

    fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        let mut analytic = hl_store::Analytic::open(&ctx.heavy_db)?;
        let rows: Vec<(i64, String, i64, i64, i64, i64)> = {
            let mut stmt = analytic.connection().prepare(
                "SELECT a.rowid, a.street, a.amount_to, a.invested_this_action,
                        a.pot_before, hi.big_blind
                 FROM actions a
                 JOIN hand_info hi ON hi.hand_id = a.hand_id
                 WHERE a.size_cat IS NULL AND a.action IN ('r', 'b')",
            )?;
            stmt.query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })?
            .collect::<Result<_, _>>()?
        };

        let mut done = 0usize;
        let mut batch: Vec<(Option<f64>, &'static str, i64)> = Vec::new();
        for (rowid, street, amount_to, invested, pot_before, big_blind) in rows {
            let frac = if street.eq_ignore_ascii_case("preflop") {
                (big_blind != 0).then(|| amount_to as f64 / big_blind as f64)
            } else {
                (pot_before != 0).then(|| invested as f64 / pot_before as f64)
            };
            let cat = frac.map(|f| label(f, &street)).unwrap_or("unknown");
            batch.push((frac, cat, rowid));
            if batch.len() >= hl_core::UPDATE_BATCH_ROWS {
                done += apply(analytic.connection_mut(), &mut batch)?;
                log::info!("{} rows sized so far", done);
            }
        }
        done += apply(analytic.connection_mut(), &mut batch)?;
        log::info!("sizing classifier: {} actions updated", done);
        Ok(())
    }
}

fn apply(
    conn: &mut rusqlite::Connection,
    batch: &mut Vec<(Option<f64>, &'static str, i64)>,
) -> anyhow::Result<usize> {
    let count = batch.len();
    let tx = conn.transaction()?;
    {
        let mut stmt = tx
            .prepare_cached("UPDATE actions SET size_frac = ?1, size_cat = ?2 WHERE rowid = ?3")?;
        for (frac, cat, rowid) in batch.iter() {
            stmt.execute(rusqlite::params![frac, cat, rowid])?;
        }
    }
    tx.commit()?;
    batch.clear();
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postflop_bounds_are_lower_inclusive() {
        assert_eq!(label(0.55, "flop"), "big");
        assert_eq!(label(0.85, "turn"), "pot");
        assert_eq!(label(0.849, "turn"), "big");
        assert_eq!(label(1.75, "river"), "huge");
        assert_eq!(label(0.0, "flop"), "unknown");
    }

    #[test]
    fn preflop_measures_big_blinds() {
        assert_eq!(label(2.0, "preflop"), "small");
        assert_eq!(label(2.25, "preflop"), "medium");
        assert_eq!(label(10.0, "preflop"), "huge");
    }

    #[test]
    fn stage_fills_raises_only() {
        let dir = tempfile::tempdir().unwrap();
        let heavy = dir.path().join("heavy_analysis.db");
        {
            let analytic = hl_store::Analytic::open(&heavy).unwrap();
            let conn = analytic.connection();
            conn.execute(
                "INSERT INTO hand_info VALUES ('H1','2025-01-10',0,0,1,100,50,0,4,'SRP')",
                [],
            )
            .unwrap();
            for (i, (street, act, amt, inv, pot)) in [
                ("preflop", "r", 200i64, 200i64, 150i64),
                ("flop", "r", 55, 55, 100),
                ("flop", "c", 0, 55, 155),
                ("turn", "r", 85, 85, 100),
            ]
            .iter()
            .enumerate()
            {
                conn.execute(
                    "INSERT INTO actions (hand_id, action_order, street, street_index, position,
                     player_id, nickname, action, amount_to, stack_before, stack_after,
                     invested_this_action, pot_before, pot_after, players_left, is_allin,
                     state_prefix, board_cards, holecards)
                     VALUES ('H1', ?1, ?2, 0, 'BTN', 'p1', 'p1', ?3, ?4, 1000, 900, ?5,
                             ?6, 200, 2, 0, '', '', '')",
                    rusqlite::params![i as i64, street, act, amt, inv, pot],
                )
                .unwrap();
            }
        }
        let ctx = Context {
            poker_db: dir.path().join("poker.db"),
            heavy_db: heavy.clone(),
            ranges_db: dir.path().join("ranges.db"),
            normalize_cur: false,
            normalize_scores: false,
            rules: crate::rules::LabelRules::fallback(),
            intentions: crate::intentions::IntentionBook::empty(),
        };
        SizingClassifier.run(&ctx).unwrap();

        let conn = rusqlite::Connection::open(&heavy).unwrap();
        let cats: Vec<(String, Option<String>, Option<f64>)> = conn
            .prepare("SELECT street, size_cat, size_frac FROM actions ORDER BY action_order")
            .unwrap()
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        // 200 over a 100 blind = 2 BB
        assert_eq!(cats[0].1.as_deref(), Some("small"));
        // 55 into 100 is a big bet, lower bound inclusive
        assert_eq!(cats[1].1.as_deref(), Some("big"));
        assert_eq!(cats[1].2, Some(0.55));
        // calls are not sized
        assert_eq!(cats[2].1, None);
        // 85 into 100 crosses the pot threshold
        assert_eq!(cats[3].1.as_deref(), Some("pot"));
    }
}
