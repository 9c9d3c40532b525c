//! Permissive view over one upstream hand payload.
use hl_core::Chips;
use serde_json::Value;

/// One seat in a hand: upstream player id, display name, starting stack,
/// hole cards, and result.
#[derive(Debug, Clone)]
pub struct Seat {
    pub stub: String,
    pub name: Option<String>,
    pub stack: Chips,
    pub hole_cards: Vec<String>,
    pub money_won: f64,
}

impl Seat {
    /// Display name, falling back to the player id.
    pub fn nickname(&self) -> &str {
        self.name.as_deref().filter(|n| !n.is_empty()).unwrap_or(&self.stub)
    }
    /// Hole cards joined the way the analytic store keeps them.
    pub fn holecards(&self) -> String {
        self.hole_cards.join(",")
    }
}

/// A raw upstream hand. Wraps the JSON value rather than a rigid struct:
/// unknown fields are tolerated and several fields appear under more than
/// one key or with malformed values (`"0:83"` style), so every accessor
/// goes through a defensive parse.
#[derive(Debug, Clone)]
pub struct Record(Value);

impl From<Value> for Record {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl Record {
    pub fn raw(&self) -> &Value {
        &self.0
    }
    pub fn to_json(&self) -> String {
        self.0.to_string()
    }

    /// First present candidate key, in priority order.
    fn pick(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter()
            .find_map(|k| self.0.get(k))
            .filter(|v| !v.is_null())
    }

    /// Hand identifier.
    pub fn id(&self) -> Option<&str> {
        self.pick(&["stub", "short_name"]).and_then(Value::as_str)
    }

    pub fn situation(&self) -> Option<&str> {
        self.pick(&["situation_string"]).and_then(Value::as_str)
    }

    pub fn pot_type(&self) -> Option<String> {
        self.pick(&["pot_type"])
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn blinds_raw(&self) -> Option<String> {
        match self.pick(&["blinds"]) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Big-blind size parsed from the `blinds` field: colon suffixes are
    /// stripped, a `b` separator keeps the trailing part, and values above
    /// one million are treated as centi-chips.
    pub fn blinds_bb(&self) -> Option<f64> {
        let raw = self.blinds_raw()?;
        let head = raw.split(':').next().unwrap_or_default();
        let digits = match head.to_lowercase().split_once('b') {
            Some((_, tail)) => tail.to_string(),
            None => head.to_string(),
        };
        let hi: i64 = digits.parse().ok()?;
        Some(if hi > 1_000_000 {
            hi as f64 / 100.0
        } else {
            hi as f64
        })
    }

    pub fn is_cash(&self) -> bool {
        self.pick(&["is_cash"]).map(truthy).unwrap_or(false)
    }
    pub fn is_mtt(&self) -> bool {
        self.pick(&["is_mtt"]).map(truthy).unwrap_or(false)
    }

    pub fn big_blind(&self) -> Chips {
        self.pick(&["big_blind_amount"]).and_then(chips).unwrap_or(0)
    }
    pub fn small_blind(&self) -> Chips {
        self.pick(&["small_blind_amount"]).and_then(chips).unwrap_or(0)
    }
    pub fn ante(&self) -> Chips {
        self.pick(&["ante_amount"]).and_then(chips).unwrap_or(0)
    }

    pub fn effective_stack(&self) -> Option<f64> {
        self.pick(&["effective_stack"]).and_then(number)
    }
    pub fn chip_value(&self) -> Option<f64> {
        self.pick(&["chip_value_in_displayed_currency"])
            .and_then(number)
    }

    pub fn partial_scores(&self) -> Option<&serde_json::Map<String, Value>> {
        self.pick(&["partial_scores"])
            .and_then(Value::as_object)
            .filter(|m| !m.is_empty())
    }

    /// Returns a copy carrying partial scores from the ingest sidecar, for
    /// payloads that lack them inline.
    pub fn with_partial_scores(mut self, scores: Value) -> Self {
        if let Value::Object(obj) = &mut self.0 {
            obj.insert("partial_scores".into(), scores);
        }
        self
    }

    /// Seats keyed by position name (`"BTN"`, `"SB"`, ...).
    pub fn positions(&self) -> Vec<(String, Seat)> {
        let Some(obj) = self.pick(&["positions"]).and_then(Value::as_object) else {
            return Vec::new();
        };
        obj.iter()
            .map(|(pos, info)| {
                let seat = Seat {
                    stub: info
                        .get("stub")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    name: info
                        .get("name")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    stack: info.get("stack").and_then(chips).unwrap_or(0),
                    hole_cards: info
                        .get("hole_cards")
                        .and_then(Value::as_array)
                        .map(|cards| {
                            cards
                                .iter()
                                .filter_map(Value::as_str)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default(),
                    money_won: info.get("money_won").and_then(number).unwrap_or(0.0),
                };
                (pos.clone(), seat)
            })
            .collect()
    }
}

/// Integer chips from a JSON value that may be a number or a corrupted
/// string like `"0:83"`; colons are stripped and parse failures default out.
fn chips(value: &Value) -> Option<Chips> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as Chips)),
        Value::String(s) => s.replace(':', "").trim().parse().ok(),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.replace(':', "").trim().parse().ok(),
        _ => None,
    }
}

/// Booleans arrive as bools, 0/1 numbers, or strings (sometimes with stray
/// colons).
fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => {
            let s = s.replace(':', "");
            match s.trim().parse::<i64>() {
                Ok(n) => n != 0,
                Err(_) => s.eq_ignore_ascii_case("true"),
            }
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: &str) -> Record {
        Record::from(serde_json::from_str::<Value>(json).unwrap())
    }

    #[test]
    fn colon_values_parse_defensively() {
        let r = record(r#"{"stub":"HandX","big_blind_amount":"0:83","is_cash":"0:1"}"#);
        assert_eq!(r.big_blind(), 83);
        assert!(r.is_cash());
    }

    #[test]
    fn blinds_variants() {
        assert_eq!(record(r#"{"blinds":"100"}"#).blinds_bb(), Some(100.0));
        assert_eq!(record(r#"{"blinds":"500:83"}"#).blinds_bb(), Some(500.0));
        assert_eq!(record(r#"{"blinds":"50b100"}"#).blinds_bb(), Some(100.0));
        assert_eq!(
            record(r#"{"blinds":"200000000"}"#).blinds_bb(),
            Some(2_000_000.0)
        );
        assert_eq!(record(r#"{"blinds":""}"#).blinds_bb(), None);
    }

    #[test]
    fn seat_extraction() {
        let r = record(
            r#"{"positions":{"BTN":{"stub":"p1","name":"hero","stack":"1000",
                "hole_cards":["As","Kh"],"money_won":12.5}}}"#,
        );
        let seats = r.positions();
        assert_eq!(seats.len(), 1);
        let (pos, seat) = &seats[0];
        assert_eq!(pos, "BTN");
        assert_eq!(seat.nickname(), "hero");
        assert_eq!(seat.stack, 1000);
        assert_eq!(seat.holecards(), "As,Kh");
    }

    #[test]
    fn id_prefers_stub() {
        let r = record(r#"{"stub":"HandA","short_name":"A"}"#);
        assert_eq!(r.id(), Some("HandA"));
        let r = record(r#"{"short_name":"A"}"#);
        assert_eq!(r.id(), Some("A"));
    }

    #[test]
    fn empty_partial_scores_is_none() {
        assert!(record(r#"{"partial_scores":{}}"#).partial_scores().is_none());
        assert!(record(r#"{"partial_scores":{"x":1.0}}"#)
            .partial_scores()
            .is_some());
    }
}
