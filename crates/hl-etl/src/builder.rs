//! Stage 1: replay each raw hand's situation string into positioned action
//! rows, plus streets, players, hand_info, and stored postflop node scores.
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;

use hl_core::Chips;
use hl_upstream::Record;
use hl_upstream::Seat;

use crate::situation;
use crate::Context;
use crate::Stage;

pub struct HandBuilder;

/// One replayed action row, in `action_order`.
#[derive(Debug)]
pub struct ActionRow {
    pub order: i64,
    pub street: &'static str,
    pub street_index: i64,
    pub position: String,
    pub player_id: String,
    pub nickname: String,
    pub action: char,
    pub amount_to: Chips,
    pub stack_before: Chips,
    pub stack_after: Chips,
    pub invested: Chips,
    pub pot_before: Chips,
    pub pot_after: Chips,
    pub players_left: i64,
    pub is_allin: bool,
    pub state_prefix: String,
    pub board_cards: String,
    pub holecards: String,
}

/// Everything Stage 1 derives from one hand.
pub struct ParsedHand {
    pub id: String,
    pub streets: Vec<(&'static str, String)>,
    pub players: Vec<(String, String, Chips, String, f64)>,
    pub actions: Vec<ActionRow>,
    pub scores: Vec<(String, Option<f64>, Option<f64>)>,
    pub big_blind: Chips,
    pub small_blind: Chips,
    pub ante: Chips,
    pub players_cnt: i64,
}

/// Postflop action order: SB first (BB when SB folded), rotating through
/// the seats still active, which stay in canonical seat order.
fn rotate_postflop(active: &[String]) -> VecDeque<String> {
    for first in ["SB", "BB"] {
        if let Some(idx) = active.iter().position(|p| p == first) {
            let mut dq: VecDeque<String> = active.iter().cloned().collect();
            dq.rotate_left(idx);
            return dq;
        }
    }
    active.iter().cloned().collect()
}

/// Replays one hand. Monetary amounts are divided by `chip_value` when
/// `normalize` is set; raise tokens inside the state text then carry the
/// rescaled amounts so node strings stay comparable.
pub fn parse_hand(record: &Record, chip_value: f64, normalize: bool) -> anyhow::Result<ParsedHand> {
    let id = record
        .id()
        .ok_or_else(|| anyhow::anyhow!("hand without id"))?
        .to_string();
    let situation = record
        .situation()
        .ok_or_else(|| anyhow::anyhow!("hand without situation string"))?;
    let chip_value = if chip_value == 0.0 { 1.0 } else { chip_value };
    let scale = |v: Chips| -> Chips {
        if normalize && chip_value != 1.0 {
            (v as f64 / chip_value) as Chips
        } else {
            v
        }
    };
    let scale_f = |v: f64| -> f64 {
        if normalize && chip_value != 1.0 {
            v / chip_value
        } else {
            v
        }
    };

    let positions: HashMap<String, Seat> = record.positions().into_iter().collect();
    anyhow::ensure!(!positions.is_empty(), "hand without positions");
    let seats: Vec<String> = hl_core::SEAT_ORDER
        .iter()
        .filter(|p| positions.contains_key(**p))
        .map(|p| p.to_string())
        .collect();
    let mut active = seats.clone();

    let mut stack0: HashMap<String, Chips> = HashMap::new();
    let mut invested: HashMap<String, Chips> = HashMap::new();
    for (pos, seat) in &positions {
        stack0.insert(pos.clone(), scale(seat.stack));
        invested.insert(pos.clone(), 0);
    }

    let big_blind = scale(record.big_blind());
    let small_blind = scale(record.small_blind());
    let ante = scale(record.ante());

    let mut pot = small_blind + big_blind + ante * seats.len() as Chips;
    if let Some(v) = invested.get_mut("SB") {
        *v += small_blind;
    }
    if let Some(v) = invested.get_mut("BB") {
        *v += big_blind;
    }
    for v in invested.values_mut() {
        *v += ante;
    }
    let mut cur_max = big_blind;

    let mut streets = Vec::new();
    let mut actions = Vec::new();
    let mut order: VecDeque<String> = active.iter().cloned().collect();
    let mut state = String::new();
    let mut board_seen = String::new();
    let mut idx = 0i64;

    for (st_idx, seg) in situation::split_streets(situation)?.into_iter().enumerate() {
        if !seg.board.is_empty() {
            board_seen.push_str(&seg.board);
            streets.push((seg.street, seg.board.clone()));
        }
        if seg.street != "preflop" {
            order = rotate_postflop(&active);
        }
        let mut board_to_add = if seg.board.is_empty() {
            String::new()
        } else {
            format!("[{}]", seg.board)
        };

        for tok in &seg.tokens {
            if !board_to_add.is_empty() {
                state.push_str(&board_to_add);
                board_to_add.clear();
            }
            let pos = order
                .front()
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("more actions than active players"))?;
            let act = tok.chars().next().expect("non-empty token");

            let mut amount_to: Chips = 0;
            let mut token_text = tok.clone();
            if act == 'r' {
                let digits = &tok[1..];
                amount_to = match digits.parse::<Chips>() {
                    Ok(raw) => scale(raw),
                    Err(_) => cur_max,
                };
                if normalize {
                    token_text = format!("r{}", amount_to);
                }
            }

            let stack_b = stack0[&pos] - invested[&pos];
            let pot_b = pot;
            let put = match act {
                'r' => {
                    let put = amount_to - invested[&pos];
                    cur_max = amount_to;
                    put
                }
                'c' => cur_max - invested[&pos],
                _ => 0,
            };
            *invested.get_mut(&pos).expect("known position") += put;
            pot += put;
            let stack_a = stack_b - put;

            if act == 'f' {
                active.retain(|p| p != &pos);
                order.pop_front();
            } else {
                order.rotate_left(1);
            }

            let seat = &positions[&pos];
            actions.push(ActionRow {
                order: idx,
                street: seg.street,
                street_index: st_idx as i64,
                position: pos.clone(),
                player_id: seat.stub.clone(),
                nickname: seat.nickname().to_string(),
                action: act,
                amount_to,
                stack_before: stack_b,
                stack_after: stack_a,
                invested: put,
                pot_before: pot_b,
                pot_after: pot,
                players_left: active.len() as i64,
                is_allin: stack_a == 0,
                state_prefix: state.clone(),
                board_cards: board_seen.clone(),
                holecards: seat.holecards(),
            });
            idx += 1;
            state.push_str(&token_text);
        }
        // betting round closes: investments reset against the next street
        cur_max = 0;
        for p in &active {
            if let Some(v) = invested.get_mut(p) {
                *v = 0;
            }
        }
    }

    let players = positions
        .iter()
        .map(|(pos, seat)| {
            (
                pos.clone(),
                seat.nickname().to_string(),
                stack0[pos],
                seat.holecards(),
                scale_f(seat.money_won),
            )
        })
        .collect();

    let scores = record
        .partial_scores()
        .map(|map| {
            map.iter()
                .map(|(node, value)| {
                    let key = if normalize {
                        situation::normalize_node(node, chip_value)
                    } else {
                        node.clone()
                    };
                    match value {
                        serde_json::Value::Object(obj) => (
                            key,
                            obj.get("action_score").and_then(|v| v.as_f64()),
                            obj.get("decision_difficulty").and_then(|v| v.as_f64()),
                        ),
                        other => (key, other.as_f64(), None),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ParsedHand {
        id,
        streets,
        players,
        actions,
        scores,
        big_blind,
        small_blind,
        ante,
        players_cnt: seats.len() as i64,
    })
}

/// The expected node string for an action: its state prefix extended with
/// the action token, raise amounts included.
fn node_for(prefix: &str, action: &str, amount_to: Chips) -> String {
    if action == "r" && amount_to > 0 {
        format!("{}r{}", prefix, amount_to)
    } else {
        format!("{}{}", prefix, action)
    }
}

/// Fills `action_score`/`decision_difficulty` on postflop rows from the
/// stored node scores: exact node match first, then a match with the raise
/// digits stripped from both sides.
fn fill_missing_scores(tx: &rusqlite::Transaction, hand_id: &str) -> anyhow::Result<()> {
    let nodes: Vec<(String, Option<f64>, Option<f64>)> = {
        let mut stmt = tx.prepare_cached(
            "SELECT node_string, action_score, decision_difficulty
             FROM postflop_scores WHERE hand_id = ?1 ORDER BY LENGTH(node_string)",
        )?;
        stmt.query_map([hand_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<_, _>>()?
    };
    if nodes.is_empty() {
        return Ok(());
    }
    let rows: Vec<(i64, String, String, Chips)> = {
        let mut stmt = tx.prepare_cached(
            "SELECT rowid, state_prefix, action, amount_to FROM actions
             WHERE hand_id = ?1 AND street != 'preflop' AND action_score IS NULL",
        )?;
        stmt.query_map([hand_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?
        .collect::<Result<_, _>>()?
    };
    let mut update = tx.prepare_cached(
        "UPDATE actions SET action_score = ?1, decision_difficulty = ?2 WHERE rowid = ?3",
    )?;
    for (rowid, prefix, action, amount_to) in rows {
        let wanted = node_for(&prefix, &action, amount_to);
        let stripped = situation::strip_raise_digits(&wanted);
        let hit = nodes
            .iter()
            .find(|(node, _, _)| *node == wanted)
            .or_else(|| {
                nodes
                    .iter()
                    .find(|(node, _, _)| situation::strip_raise_digits(node) == stripped)
            });
        if let Some((_, score, difficulty)) = hit {
            update.execute(rusqlite::params![score, difficulty, rowid])?;
        }
    }
    Ok(())
}

/// Inserts one parsed hand inside a transaction. Insert-or-ignore keeps
/// re-runs idempotent; a failure rolls the whole hand back.
fn insert_hand(
    conn: &mut rusqlite::Connection,
    hand: &ParsedHand,
    raw: &hl_store::RawHand,
    record: &Record,
) -> anyhow::Result<()> {
    let tx = conn.transaction()?;
    tx.prepare_cached(
        "INSERT OR IGNORE INTO hand_info VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
    )?
    .execute(rusqlite::params![
        hand.id,
        raw.hand_date,
        raw.seq,
        record.is_mtt() as i64,
        record.is_cash() as i64,
        hand.big_blind,
        hand.small_blind,
        hand.ante,
        hand.players_cnt,
        record.pot_type(),
    ])?;
    {
        let mut stmt = tx.prepare_cached("INSERT OR IGNORE INTO streets VALUES (?1,?2,?3)")?;
        for (street, board) in &hand.streets {
            stmt.execute(rusqlite::params![hand.id, street, board])?;
        }
    }
    {
        let mut stmt =
            tx.prepare_cached("INSERT OR IGNORE INTO players VALUES (?1,?2,?3,?4,?5,?6)")?;
        for (pos, nickname, stack0, holecards, money_won) in &hand.players {
            stmt.execute(rusqlite::params![
                hand.id, pos, nickname, stack0, holecards, money_won
            ])?;
        }
    }
    {
        let mut stmt = tx.prepare_cached(
            "INSERT OR IGNORE INTO actions
             (hand_id, action_order, street, street_index, position, player_id, nickname,
              action, amount_to, stack_before, stack_after, invested_this_action,
              pot_before, pot_after, players_left, is_allin, action_score,
              decision_difficulty, state_prefix, board_cards, holecards)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,NULL,NULL,?17,?18,?19)",
        )?;
        for a in &hand.actions {
            stmt.execute(rusqlite::params![
                hand.id,
                a.order,
                a.street,
                a.street_index,
                a.position,
                a.player_id,
                a.nickname,
                a.action.to_string(),
                a.amount_to,
                a.stack_before,
                a.stack_after,
                a.invested,
                a.pot_before,
                a.pot_after,
                a.players_left,
                a.is_allin as i64,
                a.state_prefix,
                a.board_cards,
                a.holecards,
            ])?;
        }
    }
    {
        let mut stmt =
            tx.prepare_cached("INSERT OR IGNORE INTO postflop_scores VALUES (?1,?2,?3,?4)")?;
        for (node, score, difficulty) in &hand.scores {
            stmt.execute(rusqlite::params![hand.id, node, score, difficulty])?;
        }
    }
    fill_missing_scores(&tx, &hand.id)?;
    tx.commit()?;
    Ok(())
}

impl Stage for HandBuilder {
    fn name(&self) -> &'static str {
        "builder"
    }

    fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        let primary = hl_store::Primary::open(&ctx.poker_db)?;
        let mut analytic = hl_store::Analytic::open(&ctx.heavy_db)?;
        let done: HashSet<String> = analytic.built_hand_ids()?;
        let ps_cache: HashMap<String, serde_json::Value> = primary
            .partial_scores()?
            .into_iter()
            .filter_map(|(id, json)| serde_json::from_str(&json).ok().map(|v| (id, v)))
            .collect();

        let mut built = 0usize;
        let mut skipped = 0usize;
        for raw in primary.raw_hands_excluding(&done)? {
            let value: serde_json::Value = match serde_json::from_str(&raw.raw_json) {
                Ok(v) => v,
                Err(e) => {
                    log::warn!("hand {}: unreadable JSON, skipping: {}", raw.id, e);
                    skipped += 1;
                    continue;
                }
            };
            let mut record = Record::from(value);
            // partial scores may live only in the ingest sidecar
            if record.partial_scores().is_none() {
                if let Some(extra) = ps_cache.get(&raw.id) {
                    record = record.with_partial_scores(extra.clone());
                }
            }
            let chip_value = raw
                .chip_value
                .or_else(|| record.chip_value())
                .unwrap_or(1.0);
            let parsed = match parse_hand(&record, chip_value, ctx.normalize_cur) {
                Ok(parsed) => parsed,
                Err(e) => {
                    log::warn!("hand {}: {}, skipping", raw.id, e);
                    skipped += 1;
                    continue;
                }
            };
            insert_hand(analytic.connection_mut(), &parsed, &raw, &record)?;
            built += 1;
            if built % hl_core::BUILDER_COMMIT_EVERY == 0 {
                log::info!("{} hands built so far", built);
            }
        }
        log::info!("hand builder: {} built, {} skipped", built, skipped);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(extra: &str) -> Record {
        let json = format!(
            r#"{{
              "stub": "HandTest1",
              "situation_string": "r200ccf[AhKsQd]xr550cf[2c]xx[7d]xx",
              "big_blind_amount": 100,
              "small_blind_amount": 50,
              "ante_amount": 0,
              "is_cash": 1,
              "is_mtt": 0,
              "pot_type": "SRP",
              "positions": {{
                "CO":  {{"stub": "p1", "name": "alice", "stack": 10000, "hole_cards": ["As","Kh"], "money_won": 0}},
                "BTN": {{"stub": "p2", "name": "bob",   "stack": 10000, "hole_cards": ["Qd","Qc"], "money_won": 0}},
                "SB":  {{"stub": "p3", "name": "carol", "stack": 10000, "hole_cards": ["7h","6h"], "money_won": 0}},
                "BB":  {{"stub": "p4", "name": "dave",  "stack": 10000, "hole_cards": ["2s","2d"], "money_won": 0}}
              }}{}
            }}"#,
            extra
        );
        Record::from(serde_json::from_str::<serde_json::Value>(&json).unwrap())
    }

    #[test]
    fn token_count_matches_action_rows() {
        let hand = parse_hand(&fixture(""), 1.0, false).unwrap();
        assert_eq!(hand.actions.len(), 12);
        assert_eq!(hand.players_cnt, 4);
    }

    #[test]
    fn preflop_starts_left_of_bb_and_flop_at_sb() {
        let hand = parse_hand(&fixture(""), 1.0, false).unwrap();
        assert_eq!(hand.actions[0].position, "CO");
        assert_eq!(hand.actions[0].action, 'r');
        assert_eq!(hand.actions[0].street, "preflop");
        assert_eq!(hand.actions[4].street, "flop");
        assert_eq!(hand.actions[4].position, "SB");
        assert_eq!(hand.actions[4].action, 'x');
    }

    #[test]
    fn chip_accounting_invariants_hold() {
        let hand = parse_hand(&fixture(""), 1.0, false).unwrap();
        for a in &hand.actions {
            assert_eq!(a.stack_after, a.stack_before - a.invested);
            assert_eq!(a.pot_after, a.pot_before + a.invested);
        }
        let total: Chips = hand.actions.iter().map(|a| a.invested).sum();
        let last = hand.actions.last().unwrap();
        let first = hand.actions.first().unwrap();
        assert_eq!(last.pot_after - first.pot_before, total);
    }

    #[test]
    fn players_left_never_increases() {
        let hand = parse_hand(&fixture(""), 1.0, false).unwrap();
        let mut prev = i64::MAX;
        for a in &hand.actions {
            assert!(a.players_left <= prev);
            assert!(a.players_left > 0);
            prev = a.players_left;
        }
        assert_eq!(hand.actions.last().unwrap().players_left, 2);
    }

    #[test]
    fn state_prefix_chains_with_board_brackets() {
        let hand = parse_hand(&fixture(""), 1.0, false).unwrap();
        for pair in hand.actions.windows(2) {
            let base = format!("{}{}", pair[0].state_prefix, token(&pair[0]));
            let next = &pair[1].state_prefix;
            if pair[1].street == pair[0].street {
                assert_eq!(*next, base);
            } else {
                // street transition inserts the bracketed board
                assert!(next.starts_with(&base));
                assert!(next[base.len()..].starts_with('['));
                assert!(next.ends_with(']'));
            }
        }
        let flop_first = &hand.actions[4];
        assert_eq!(flop_first.state_prefix, "r200ccf[AhKsQd]");
        assert_eq!(flop_first.board_cards, "AhKsQd");
    }

    fn token(a: &ActionRow) -> String {
        if a.action == 'r' {
            format!("r{}", a.amount_to)
        } else {
            a.action.to_string()
        }
    }

    #[test]
    fn pot_and_call_amounts_follow_the_blinds() {
        let hand = parse_hand(&fixture(""), 1.0, false).unwrap();
        // CO opens to 200 over blinds 50/100: pot was 150
        assert_eq!(hand.actions[0].pot_before, 150);
        assert_eq!(hand.actions[0].invested, 200);
        // SB already posted 50, so the call costs 150
        assert_eq!(hand.actions[2].position, "SB");
        assert_eq!(hand.actions[2].invested, 150);
        // BB folds for free
        assert_eq!(hand.actions[3].invested, 0);
    }

    #[test]
    fn normalization_rescales_amounts_and_state() {
        let hand = parse_hand(&fixture(""), 100.0, true).unwrap();
        assert_eq!(hand.big_blind, 1);
        assert_eq!(hand.actions[0].amount_to, 2);
        assert_eq!(hand.actions[4].state_prefix, "r2ccf[AhKsQd]");
    }

    #[test]
    fn partial_scores_become_node_rows() {
        let extra = r#",
            "partial_scores": {
                "r200ccf[AhKsQd]xr550": {"action_score": 0.71, "decision_difficulty": 0.33},
                "r200ccf[AhKsQd]xr999c": 0.42
            }"#;
        let hand = parse_hand(&fixture(extra), 1.0, false).unwrap();
        assert_eq!(hand.scores.len(), 2);
        assert!(hand
            .scores
            .iter()
            .any(|(n, s, d)| n == "r200ccf[AhKsQd]xr550" && *s == Some(0.71) && *d == Some(0.33)));
        assert!(hand
            .scores
            .iter()
            .any(|(n, s, d)| n == "r200ccf[AhKsQd]xr999c" && *s == Some(0.42) && d.is_none()));
    }

    #[test]
    fn stage_backfills_action_scores_by_node() {
        let dir = tempfile::tempdir().unwrap();
        let poker = dir.path().join("poker.db");
        let heavy = dir.path().join("heavy_analysis.db");
        let extra = r#",
            "partial_scores": {
                "r200ccf[AhKsQd]xr550": 0.71,
                "r200ccf[AhKsQd]xr999c": 0.42
            }"#;
        let record = fixture(extra);
        {
            let mut primary = hl_store::Primary::open(&poker).unwrap();
            primary
                .insert_hands(&[hl_store::HandRow {
                    id: "HandTest1".into(),
                    hand_date: "2025-01-10".into(),
                    seq: 0,
                    raw_json: record.to_json(),
                    chip_value: None,
                }])
                .unwrap();
        }
        let ctx = Context {
            poker_db: poker,
            heavy_db: heavy.clone(),
            ranges_db: dir.path().join("ranges.db"),
            normalize_cur: false,
            normalize_scores: false,
            rules: crate::rules::LabelRules::fallback(),
            intentions: crate::intentions::IntentionBook::empty(),
        };
        HandBuilder.run(&ctx).unwrap();

        let conn = rusqlite::Connection::open(&heavy).unwrap();
        let actions: i64 = conn
            .query_row("SELECT COUNT(*) FROM actions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(actions, 12);
        // exact node match: CO's flop raise
        let exact: f64 = conn
            .query_row(
                "SELECT action_score FROM actions
                 WHERE street = 'flop' AND position = 'CO' AND action = 'r'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert!((exact - 0.71).abs() < 1e-12);
        // digit-stripped match: BTN's flop call against r999 node
        let stripped: f64 = conn
            .query_row(
                "SELECT action_score FROM actions
                 WHERE street = 'flop' AND position = 'BTN' AND action = 'c'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert!((stripped - 0.42).abs() < 1e-12);
        // re-running is a no-op
        HandBuilder.run(&ctx).unwrap();
        let again: i64 = conn
            .query_row("SELECT COUNT(*) FROM actions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(again, 12);
    }
}
