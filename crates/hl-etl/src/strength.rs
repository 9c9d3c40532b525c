//! Stage 5: risk-adjusted hand-strength score (`j_score`, 1-100).
//!
//! Preflop strength is the hand's rank in the 169-hand reference order
//! (Chen formula when absent), taken as-is. Postflop strength is the
//! made-hand percentile, shrunk by a logarithmic risk adjustment so a
//! small bet barely moves the score while an overbet cuts it hard.
use hl_cards::chen_fraction;
use hl_cards::clean_cards;
use hl_cards::hand_key;
use hl_cards::made_hand_fraction;
use hl_cards::preflop_fraction;
use hl_cards::Hand;

use crate::Context;
use crate::Stage;

pub struct HandStrengthScorer;

/// `1 − ln(1 + min(inv/pot, 5)) / ln(6)`: committing the pot costs about a
/// third of the score, five pots nearly all of it.
pub fn risk_adjustment(invested: i64, pot_before: i64) -> f64 {
    if pot_before == 0 {
        return 1.0;
    }
    let ratio = (invested as f64 / pot_before as f64).min(5.0);
    1.0 - (1.0 + ratio).ln() / 6.0f64.ln()
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Scores one action row.
pub fn score(street: &str, holecards: &str, board_cards: &str, invested: i64, pot_before: i64) -> f64 {
    let hole = clean_cards(holecards);
    let hole = if hole.len() >= 4 {
        &hole[..4]
    } else {
        hole.as_str()
    };
    let (base, adj) = if street.eq_ignore_ascii_case("preflop") {
        let base = preflop_fraction(&hand_key(hole)).unwrap_or_else(|| chen_fraction(hole));
        (base, 1.0)
    } else {
        let board = clean_cards(board_cards);
        let base = Hand::try_from(hole)
            .ok()
            .zip(Hand::try_from(board.as_str()).ok())
            .and_then(|(h, b)| made_hand_fraction(h, b))
            .unwrap_or_else(|| chen_fraction(hole) * 0.8);
        (base, risk_adjustment(invested, pot_before))
    };
    round1(base.clamp(0.0, 1.0) * adj * 99.0 + 1.0)
}

impl Stage for HandStrengthScorer {
    fn name(&self) -> &'static str {
        "strength"
    }

    fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        let mut analytic = hl_store::Analytic::open(&ctx.heavy_db)?;
        let rows: Vec<(i64, String, String, String, i64, i64)> = {
            let mut stmt = analytic.connection().prepare(
                "SELECT rowid, street, COALESCE(holecards, ''), COALESCE(board_cards, ''),
                        COALESCE(invested_this_action, 0), COALESCE(pot_before, 0)
                 FROM actions WHERE j_score IS NULL",
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
        let mut batch: Vec<(f64, i64)> = Vec::new();
        for (rowid, street, holecards, board_cards, invested, pot_before) in rows {
            batch.push((
                score(&street, &holecards, &board_cards, invested, pot_before),
                rowid,
            ));
            if batch.len() >= hl_core::UPDATE_BATCH_ROWS {
                done += apply(analytic.connection_mut(), &mut batch)?;
                log::info!("{} rows scored so far", done);
            }
        }
        done += apply(analytic.connection_mut(), &mut batch)?;
        log::info!("strength scorer: {} actions updated", done);
        Ok(())
    }
}

fn apply(conn: &mut rusqlite::Connection, batch: &mut Vec<(f64, i64)>) -> anyhow::Result<usize> {
    let count = batch.len();
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached("UPDATE actions SET j_score = ?1 WHERE rowid = ?2")?;
        for (j, rowid) in batch.iter() {
            stmt.execute(rusqlite::params![j, rowid])?;
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
    fn pot_sized_commitment_shrinks_by_ln2_over_ln6() {
        let adj = risk_adjustment(100, 100);
        assert!((adj - (1.0 - 2.0f64.ln() / 6.0f64.ln())).abs() < 1e-12);
        assert!((adj - 0.613).abs() < 0.001);
    }

    #[test]
    fn risk_is_capped_at_five_pots() {
        assert_eq!(risk_adjustment(500, 100), risk_adjustment(5000, 100));
        assert_eq!(risk_adjustment(50, 0), 1.0);
    }

    #[test]
    fn preflop_top_hand_scores_100() {
        assert_eq!(score("preflop", "Ad,Ac", "", 300, 100), 100.0);
    }

    #[test]
    fn preflop_ignores_risk() {
        assert_eq!(
            score("preflop", "As,Kh", "", 0, 100),
            score("preflop", "As,Kh", "", 1000, 100)
        );
    }

    #[test]
    fn midstrength_pot_bet_lands_near_31() {
        // base 0.5 with a pot-sized bet: adj ≈ 0.613, j ≈ 31.3
        let j = 0.5 * risk_adjustment(100, 100) * 99.0 + 1.0;
        let j = (j * 10.0).round() / 10.0;
        assert!((j - 31.3).abs() <= 0.1);
    }

    #[test]
    fn postflop_uses_the_evaluator() {
        // top set on a dry board, no investment: near the top of the scale
        let strong = score("flop", "As,Ah", "AdKc2s", 0, 100);
        let weak = score("flop", "7h,6h", "AdKc2s", 0, 100);
        assert!(strong > 90.0);
        assert!(weak < strong);
        assert!((1.0..=100.0).contains(&strong));
        assert!((1.0..=100.0).contains(&weak));
    }

    #[test]
    fn short_boards_fall_back_to_scaled_chen() {
        let j = score("flop", "As,Kh", "", 0, 100);
        let chen = chen_fraction("AsKh") * 0.8;
        assert_eq!(j, ((chen * 99.0 + 1.0) * 10.0).round() / 10.0);
    }
}
