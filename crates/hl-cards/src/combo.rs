//! Hole-card canonicalization for reference-range lookups.
use std::sync::OnceLock;

fn card_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"([2-9TJQKAtjqka])([SHDCshdc])").expect("card regex"))
}

/// Rank height within `AKQJT98765432` (0 = ace). Lower is higher-ranked.
fn height(rank: char) -> usize {
    "AKQJT98765432"
        .find(rank.to_ascii_uppercase())
        .expect("valid rank")
}

/// Extracts every well-formed card from a free-form string and normalizes
/// case: `"Jc, Kh, ts" -> "JcKhTs"`.
pub fn clean_cards(raw: &str) -> String {
    card_re()
        .captures_iter(raw)
        .map(|cap| {
            let rank = cap[1].to_uppercase();
            let suit = cap[2].to_lowercase();
            format!("{}{}", rank, suit)
        })
        .collect()
}

/// Canonical exact-card combo: higher-ranked card first, `"8h9s" -> "9s8h"`.
/// Expects a cleaned 4-character combo.
pub fn canonical_cards(combo: &str) -> String {
    let chars = combo.chars().collect::<Vec<_>>();
    if chars.len() != 4 {
        return String::new();
    }
    let (r1, s1, r2, s2) = (chars[0], chars[1], chars[2], chars[3]);
    if height(r1) <= height(r2) {
        format!("{}{}{}{}", r1, s1, r2, s2)
    } else {
        format!("{}{}{}{}", r2, s2, r1, s1)
    }
}

/// 169-hand key: `"AdAc" -> "AA"`, `"As7s" -> "A7s"`, `"7dAs" -> "A7o"`.
/// Expects a cleaned 4-character combo; returns empty otherwise.
pub fn hand_key(hole: &str) -> String {
    let chars = hole.chars().collect::<Vec<_>>();
    if chars.len() != 4 {
        return String::new();
    }
    let (mut r1, mut s1, mut r2, mut s2) = (chars[0], chars[1], chars[2], chars[3]);
    if height(r2) < height(r1) {
        (r1, s1, r2, s2) = (r2, s2, r1, s1);
    }
    if r1 == r2 {
        format!("{}{}", r1, r2)
    } else {
        let suffix = if s1.eq_ignore_ascii_case(&s2) { 's' } else { 'o' };
        format!("{}{}{}", r1, r2, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleans_separators_and_case() {
        assert_eq!(clean_cards("Jc, Kh, ts"), "JcKhTs");
        assert_eq!(clean_cards(""), "");
        assert_eq!(clean_cards("Xy"), "");
    }

    #[test]
    fn canonical_puts_high_card_first() {
        assert_eq!(canonical_cards("8h9s"), "9s8h");
        assert_eq!(canonical_cards("As7d"), "As7d");
        assert_eq!(canonical_cards("AhKs"), "AhKs");
    }

    #[test]
    fn keys_pairs_suited_offsuit() {
        assert_eq!(hand_key("AdAc"), "AA");
        assert_eq!(hand_key("As7s"), "A7s");
        assert_eq!(hand_key("7dAs"), "A7o");
        assert_eq!(hand_key("KhQh"), "KQs");
        assert_eq!(hand_key("bad"), "");
    }
}
