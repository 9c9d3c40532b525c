//! Situation-string parsing shared by the parser, matcher, and joiner.
//!
//! A situation string is a flat action record: `x`, `f`, `c` are
//! single-character actions, `r` starts a raise whose amount is an
//! unbounded decimal run, and `[cards]` segments delimit street
//! transitions. Any other character is a parse error.
use std::sync::OnceLock;

/// Street names in play order.
pub const STREETS: [&str; 4] = ["preflop", "flop", "turn", "river"];

/// The actions of one street plus the board it revealed.
#[derive(Debug, PartialEq)]
pub struct StreetSeg {
    pub street: &'static str,
    pub tokens: Vec<String>,
    pub board: String,
}

/// Splits a situation string into lowercase action tokens.
pub fn tokenize(s: &str) -> anyhow::Result<Vec<String>> {
    let bytes = s.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'x' | b'f' | b'c' => {
                out.push((bytes[i] as char).to_string());
                i += 1;
            }
            b'r' => {
                let mut j = i + 1;
                while j < bytes.len() && bytes[j].is_ascii_digit() {
                    j += 1;
                }
                out.push(s[i..j].to_string());
                i = j;
            }
            other => anyhow::bail!("invalid character '{}' in situation string", other as char),
        }
    }
    Ok(out)
}

/// Splits on `[board]` segments into per-street token lists. Streets
/// advance preflop → flop → turn → river; further segments stay river.
/// Segments with neither tokens nor board are dropped.
pub fn split_streets(s: &str) -> anyhow::Result<Vec<StreetSeg>> {
    let mut segs = Vec::new();
    let mut street = 0usize;
    let mut cur = String::new();
    let mut board = String::new();
    let mut rest = s;
    while let Some(open) = rest.find('[') {
        cur.push_str(&rest[..open]);
        let close = rest[open..]
            .find(']')
            .map(|off| open + off)
            .ok_or_else(|| anyhow::anyhow!("unterminated board segment"))?;
        segs.push(StreetSeg {
            street: STREETS[street],
            tokens: tokenize(&cur)?,
            board: std::mem::take(&mut board),
        });
        board = rest[open + 1..close].to_string();
        cur.clear();
        street = (street + 1).min(STREETS.len() - 1);
        rest = &rest[close + 1..];
    }
    cur.push_str(rest);
    segs.push(StreetSeg {
        street: STREETS[street],
        tokens: tokenize(&cur)?,
        board,
    });
    segs.retain(|seg| !seg.tokens.is_empty() || !seg.board.is_empty());
    Ok(segs)
}

/// Collapses a trailing run of two or more folds into a single fold, the
/// way the solver reference stores its sequences.
pub fn compress_trailing_folds(tokens: &mut Vec<String>) {
    while tokens.len() >= 2
        && tokens[tokens.len() - 1] == "f"
        && tokens[tokens.len() - 2] == "f"
    {
        tokens.pop();
    }
}

/// Upper-cased dash-joined sequence of action kinds: `["r200","f"]` → `"R-F"`.
pub fn to_seq(tokens: &[String]) -> String {
    tokens
        .iter()
        .filter_map(|t| t.chars().next())
        .map(|c| c.to_ascii_uppercase().to_string())
        .collect::<Vec<_>>()
        .join("-")
}

/// LIKE pattern over the reference's action_sequence column.
pub fn like_pattern(seq: &str) -> String {
    if seq.is_empty() {
        "%".to_string()
    } else {
        format!("{}%", seq.to_uppercase())
    }
}

fn raise_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"r\d+").expect("raise regex"))
}

/// Replaces every raise amount with a bare `r`, for amount-insensitive node
/// comparison.
pub fn strip_raise_digits(s: &str) -> String {
    raise_re().replace_all(s, "r").into_owned()
}

/// Rescales every raise amount in a node string by `1 / chip_value`,
/// mirroring the normalization applied to action amounts.
pub fn normalize_node(node: &str, chip_value: f64) -> String {
    if chip_value == 0.0 || chip_value == 1.0 {
        return node.to_string();
    }
    raise_re()
        .replace_all(node, |cap: &regex::Captures| {
            let amount: f64 = cap[0][1..].parse().unwrap_or(0.0);
            format!("r{}", (amount / chip_value) as i64)
        })
        .into_owned()
}
