//! Stage 4: semantic action labels and IP/OOP status.
//!
//! A per-hand replay tracks the preflop aggressor, per-street raise counts,
//! who has checked, and how the previous street ended. The declarative rule
//! set gets first refusal on every aggressive action; the built-in machine
//! supplies the ordinal labels otherwise.
use std::collections::HashMap;
use std::collections::HashSet;

use crate::rules::LabelRules;
use crate::Context;
use crate::Stage;

pub struct ActionLabeler;

/// IP/OOP helper over the 6-max order, with the UTG/LJ alias.
pub struct PositionTracker {
    order: Vec<String>,
    flop_btn: usize,
}

impl PositionTracker {
    pub fn new(preflop_positions: &[String]) -> Self {
        let mut order = Vec::new();
        for spot in hl_core::ORDER_6MAX {
            match spot.split_once('/') {
                Some((a, b)) => {
                    if preflop_positions.iter().any(|p| p == a) {
                        order.push(a.to_string());
                    } else if preflop_positions.iter().any(|p| p == b) {
                        order.push(b.to_string());
                    }
                }
                None => {
                    if preflop_positions.iter().any(|p| p == spot) {
                        order.push(spot.to_string());
                    }
                }
            }
        }
        let flop_btn = order.iter().position(|p| p == "BTN").unwrap_or(0);
        Self { order, flop_btn }
    }

    /// Preflop the button is in position; postflop the active seat one to
    /// the button's right in the 6-max order acts last.
    pub fn ip_status(&self, street: &str, pos: &str) -> &'static str {
        if street.eq_ignore_ascii_case("preflop") {
            return if pos == "BTN" { "IP" } else { "OOP" };
        }
        let Some(idx) = self.order.iter().position(|p| p == pos) else {
            return "OOP";
        };
        let last = (self.flop_btn + self.order.len() - 1) % self.order.len();
        if idx == last { "IP" } else { "OOP" }
    }
}

/// Per-hand label state machine.
struct HandLabeler<'a> {
    rules: &'a LabelRules,
    street: String,
    raise_cnt: i64,
    checks: HashSet<String>,
    street_actions: Vec<String>,
    preflop_aggressor: Option<String>,
    prev_checked_through: bool,
    prev_had_bet: bool,
}

impl<'a> HandLabeler<'a> {
    fn new(rules: &'a LabelRules) -> Self {
        Self {
            rules,
            street: "preflop".into(),
            raise_cnt: 0,
            checks: HashSet::new(),
            street_actions: Vec::new(),
            preflop_aggressor: None,
            prev_checked_through: false,
            prev_had_bet: false,
        }
    }

    fn roll_street(&mut self, street: &str) {
        let n = self.street_actions.len();
        self.prev_checked_through =
            n >= 2 && self.street_actions[n - 1] == "x" && self.street_actions[n - 2] == "x";
        self.prev_had_bet = self
            .street_actions
            .iter()
            .any(|a| a.starts_with('r') || a.starts_with('b'));
        self.street = street.to_string();
        self.raise_cnt = 0;
        self.checks.clear();
        self.street_actions.clear();
    }

    fn process(&mut self, street: &str, pos: &str, tok: &str, ip: &str) -> String {
        if !street.eq_ignore_ascii_case(&self.street) {
            self.roll_street(street);
        }
        self.street_actions.push(tok.to_string());
        let preflop = street.eq_ignore_ascii_case("preflop");
        match tok.chars().next() {
            Some('x') => {
                self.checks.insert(pos.to_string());
                "check".into()
            }
            Some('f') => "fold".into(),
            Some('c') => {
                if ip == "IP" && self.raise_cnt == 0 && !preflop {
                    "float".into()
                } else {
                    "call".into()
                }
            }
            Some('r') | Some('b') => {
                let before = self.raise_cnt;
                self.raise_cnt += 1;
                let ordinal = before + 1;
                if preflop && self.preflop_aggressor.is_none() {
                    self.preflop_aggressor = Some(pos.to_string());
                }
                let is_first_bet = !preflop && before == 0;
                let is_aggressor = self.preflop_aggressor.as_deref() == Some(pos);
                let had_checked = self.checks.contains(pos);
                let ctx: HashMap<&'static str, serde_yaml::Value> = HashMap::from([
                    ("kind", serde_yaml::Value::from("raise")),
                    ("ordinal", serde_yaml::Value::from(ordinal)),
                    ("ordinal_plus1", serde_yaml::Value::from(ordinal + 1)),
                    ("is_first_bet", serde_yaml::Value::from(is_first_bet)),
                    ("is_preflop_aggressor", serde_yaml::Value::from(is_aggressor)),
                    ("had_checked", serde_yaml::Value::from(had_checked)),
                    (
                        "prev_street_checked_through",
                        serde_yaml::Value::from(self.prev_checked_through),
                    ),
                    (
                        "prev_street_had_bet",
                        serde_yaml::Value::from(self.prev_had_bet),
                    ),
                    ("ip", serde_yaml::Value::from(ip)),
                    ("street", serde_yaml::Value::from(street.to_lowercase())),
                ]);
                if let Some(label) = self.rules.resolve(street, &ctx) {
                    return label;
                }
                // built-in ordinal behavior
                if preflop {
                    if ordinal == 1 {
                        "open".into()
                    } else {
                        format!("{}bet", ordinal)
                    }
                } else if is_first_bet {
                    let probe_street = street.eq_ignore_ascii_case("turn")
                        || street.eq_ignore_ascii_case("river");
                    if is_aggressor {
                        "cont".into()
                    } else if probe_street
                        && self.prev_checked_through
                        && !self.prev_had_bet
                        && ip == "OOP"
                    {
                        "probe".into()
                    } else if ip == "OOP" {
                        "donk".into()
                    } else {
                        "bet".into()
                    }
                } else if had_checked {
                    "checkraise".into()
                } else if ordinal == 2 {
                    "raise".into()
                } else {
                    format!("{}bet", ordinal)
                }
            }
            _ => "unknown".into(),
        }
    }
}

/// Labels one hand's rows: `(label, ip, rowid)` per action in order.
fn label_hand(
    rules: &LabelRules,
    rows: &[(i64, String, String, String)],
) -> Vec<(String, &'static str, i64)> {
    let preflop: Vec<String> = rows
        .iter()
        .filter(|(_, street, _, _)| street.eq_ignore_ascii_case("preflop"))
        .map(|(_, _, pos, _)| pos.clone())
        .collect();
    let tracker = PositionTracker::new(&preflop);
    let mut labeler = HandLabeler::new(rules);
    rows.iter()
        .map(|(rowid, street, pos, tok)| {
            let ip = tracker.ip_status(street, pos);
            (labeler.process(street, pos, tok, ip), ip, *rowid)
        })
        .collect()
}

impl Stage for ActionLabeler {
    fn name(&self) -> &'static str {
        "labels"
    }

    fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        let mut analytic = hl_store::Analytic::open(&ctx.heavy_db)?;
        let hids: Vec<String> = {
            let mut stmt = analytic
                .connection()
                .prepare("SELECT DISTINCT hand_id FROM actions WHERE action_label IS NULL")?;
            stmt.query_map([], |row| row.get(0))?
                .collect::<Result<_, _>>()?
        };
        let mut total = 0usize;
        for hid in hids {
            let rows: Vec<(i64, String, String, String)> = {
                let mut stmt = analytic.connection().prepare_cached(
                    "SELECT rowid, street, position, action FROM actions
                     WHERE hand_id = ?1 ORDER BY action_order",
                )?;
                stmt.query_map([&hid], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .collect::<Result<_, _>>()?
            };
            let updates = label_hand(&ctx.rules, &rows);
            let tx = analytic.connection_mut().transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "UPDATE actions SET action_label = ?1, ip_status = ?2 WHERE rowid = ?3",
                )?;
                for (label, ip, rowid) in &updates {
                    stmt.execute(rusqlite::params![label, ip, rowid])?;
                }
            }
            tx.commit()?;
            total += updates.len();
        }
        log::info!("action labeler: {} actions updated", total);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shipped_rules() -> LabelRules {
        LabelRules::parse(include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../../assets/action_rules.yml"
        )))
        .unwrap()
    }

    fn rows(seq: &[(&str, &str, &str)]) -> Vec<(i64, String, String, String)> {
        seq.iter()
            .enumerate()
            .map(|(i, (street, pos, tok))| {
                (i as i64, street.to_string(), pos.to_string(), tok.to_string())
            })
            .collect()
    }

    fn labels_of(rules: &LabelRules, seq: &[(&str, &str, &str)]) -> Vec<String> {
        label_hand(rules, &rows(seq))
            .into_iter()
            .map(|(label, _, _)| label)
            .collect()
    }

    #[test]
    fn open_threebet_coldcall_then_flop_line() {
        let rules = shipped_rules();
        let labels = labels_of(
            &rules,
            &[
                ("preflop", "BTN", "r250"),
                ("preflop", "SB", "r900"),
                ("preflop", "BB", "c"),
                ("preflop", "BTN", "c"),
                ("flop", "BB", "x"),
                ("flop", "BTN", "r500"),
                ("flop", "SB", "r1500"),
                ("flop", "BTN", "c"),
            ],
        );
        // BTN opened, so its flop bet is a continuation bet; SB had not
        // checked this street, so the raise is a plain raise
        assert_eq!(
            labels,
            ["open", "3bet", "call", "call", "check", "cbet", "raise", "call"]
        );
    }

    #[test]
    fn checkraise_requires_a_prior_check() {
        let rules = shipped_rules();
        let labels = labels_of(
            &rules,
            &[
                ("preflop", "BTN", "r250"),
                ("preflop", "BB", "c"),
                ("flop", "BB", "x"),
                ("flop", "BTN", "r300"),
                ("flop", "BB", "r900"),
            ],
        );
        assert_eq!(labels, ["open", "call", "check", "cbet", "checkraise"]);
    }

    #[test]
    fn float_is_an_in_position_unraised_call() {
        // heads-up the seat one left of the button (BB) acts last
        let rules = shipped_rules();
        let labels = labels_of(
            &rules,
            &[
                ("preflop", "BTN", "r250"),
                ("preflop", "BB", "c"),
                ("flop", "BB", "c"),
            ],
        );
        assert_eq!(labels[2], "float");
    }

    #[test]
    fn donk_is_an_oop_nonaggressor_lead() {
        let rules = shipped_rules();
        let labels = labels_of(
            &rules,
            &[
                ("preflop", "BTN", "r250"),
                ("preflop", "SB", "c"),
                ("preflop", "BB", "f"),
                ("flop", "SB", "r300"),
            ],
        );
        assert_eq!(labels[3], "donk");
    }

    #[test]
    fn probe_after_a_checked_through_street() {
        let rules = shipped_rules();
        let labels = labels_of(
            &rules,
            &[
                ("preflop", "BTN", "c"),
                ("preflop", "SB", "c"),
                ("preflop", "BB", "x"),
                ("flop", "SB", "x"),
                ("flop", "BB", "x"),
                ("flop", "BTN", "x"),
                ("turn", "SB", "r200"),
            ],
        );
        assert_eq!(labels[6], "probe");
    }

    #[test]
    fn fallback_uses_ordinal_preflop_names() {
        let rules = LabelRules::fallback();
        let labels = labels_of(
            &rules,
            &[
                ("preflop", "BTN", "r250"),
                ("preflop", "SB", "r900"),
                ("preflop", "BTN", "r2500"),
            ],
        );
        assert_eq!(labels, ["open", "2bet", "3bet"]);
    }

    #[test]
    fn fallback_labels_aggressor_bet_cont() {
        let rules = LabelRules::fallback();
        let labels = labels_of(
            &rules,
            &[
                ("preflop", "BTN", "r250"),
                ("preflop", "BB", "c"),
                ("flop", "BB", "x"),
                ("flop", "BTN", "r300"),
            ],
        );
        assert_eq!(labels[3], "cont");
    }

    #[test]
    fn ip_status_tracks_button() {
        let tracker = PositionTracker::new(&[
            "UTG".into(),
            "HJ".into(),
            "CO".into(),
            "BTN".into(),
            "SB".into(),
            "BB".into(),
        ]);
        assert_eq!(tracker.ip_status("preflop", "BTN"), "IP");
        assert_eq!(tracker.ip_status("preflop", "CO"), "OOP");
        assert_eq!(tracker.ip_status("flop", "BTN"), "IP");
        assert_eq!(tracker.ip_status("flop", "SB"), "OOP");
    }

    #[test]
    fn ip_status_when_button_is_out() {
        // BTN absent: the last remaining seat before it acts last
        let tracker = PositionTracker::new(&["CO".into(), "SB".into(), "BB".into()]);
        assert_eq!(tracker.ip_status("flop", "BB"), "IP");
        assert_eq!(tracker.ip_status("flop", "CO"), "OOP");
    }
}
