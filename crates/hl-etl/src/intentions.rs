//! Intention mapping tree: `{street}/{label}.json` assets.
//!
//! Each file carries `detailed_mappings` (strength x seven size buckets,
//! preferred) and `strength_mappings` (strength x three size groups,
//! fallback). Files are read once at pipeline start; the filesystem is the
//! source of truth between runs.
use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Mapping {
    #[serde(default)]
    detailed_mappings: HashMap<String, HashMap<String, String>>,
    #[serde(default)]
    strength_mappings: HashMap<String, HashMap<String, String>>,
}

/// The loaded intention tree, keyed by `(street, label)` lowercase.
#[derive(Debug, Clone, Default)]
pub struct IntentionBook {
    maps: HashMap<(String, String), Mapping>,
}

/// Strength bucket from a 1-100 score: `low` ≤ 33 < `medium` ≤ 66 < `high`.
pub fn strength_bucket(j_score: f64) -> &'static str {
    if j_score <= 33.0 {
        "low"
    } else if j_score <= 66.0 {
        "medium"
    } else {
        "high"
    }
}

/// Seven-way size bucket from the invested/pot ratio.
pub fn size_bucket(ratio: f64) -> &'static str {
    match ratio {
        r if r < 0.20 => "tiny",
        r if r < 0.35 => "small",
        r if r < 0.55 => "medium",
        r if r < 0.85 => "big",
        r if r < 1.10 => "pot",
        r if r < 1.75 => "over",
        _ => "huge",
    }
}

/// Coarse three-way grouping of the seven buckets.
pub fn size_group(bucket: &str) -> &'static str {
    match bucket {
        "tiny" | "small" => "small",
        "medium" => "medium",
        _ => "large",
    }
}

impl IntentionBook {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Walks `{root}/{street}/{label}.json` for the four streets.
    pub fn load(root: &Path) -> Self {
        let mut maps = HashMap::new();
        for street in crate::situation::STREETS {
            let dir = root.join(street);
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension() != Some(std::ffi::OsStr::new("json")) {
                    continue;
                }
                let Some(label) = path.file_stem().map(|s| s.to_string_lossy().to_lowercase())
                else {
                    continue;
                };
                match std::fs::read_to_string(&path)
                    .map_err(anyhow::Error::from)
                    .and_then(|text| Ok(serde_json::from_str::<Mapping>(&text)?))
                {
                    Ok(mapping) => {
                        maps.insert((street.to_string(), label), mapping);
                    }
                    Err(e) => log::warn!("bad intention file {}: {}", path.display(), e),
                }
            }
        }
        log::info!("loaded {} intention mappings", maps.len());
        Self { maps }
    }

    fn mapping(&self, street: &str, label: &str) -> Option<&Mapping> {
        self.maps.get(&(street.to_string(), label.to_string()))
    }

    /// Resolves one action's intention.
    pub fn intention(
        &self,
        street: &str,
        label: &str,
        j_score: f64,
        invested: i64,
        pot_before: i64,
    ) -> String {
        let street = street.to_lowercase();
        let label = label.to_lowercase();
        // checks carry no sizing information at all
        if label == "check" {
            return "check".into();
        }
        if (label == "call" || label == "fold") && self.mapping(&street, &label).is_none() {
            let word = match strength_bucket(j_score) {
                "high" => "strong",
                "medium" => "medium",
                _ => "weak",
            };
            return format!("{}-{}", label, word);
        }
        let strength = strength_bucket(j_score);
        let ratio = if pot_before > 0 {
            invested.max(0) as f64 / pot_before as f64
        } else {
            0.0
        };
        let size = size_bucket(ratio);
        let group = size_group(size);
        let mapping = self
            .mapping(&street, &label)
            .or_else(|| self.mapping(&street, "raise"));
        if let Some(mapping) = mapping {
            if let Some(intent) = mapping
                .detailed_mappings
                .get(strength)
                .and_then(|row| row.get(size))
                .filter(|s| !s.is_empty())
            {
                return intent.clone();
            }
            if let Some(intent) = mapping
                .strength_mappings
                .get(strength)
                .and_then(|row| row.get(group))
                .filter(|s| !s.is_empty())
            {
                return intent.clone();
            }
        }
        format!("{}-{}-{}", label, strength, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book_with(street: &str, label: &str, json: &str) -> IntentionBook {
        let mut maps = HashMap::new();
        maps.insert(
            (street.to_string(), label.to_string()),
            serde_json::from_str::<Mapping>(json).unwrap(),
        );
        IntentionBook { maps }
    }

    #[test]
    fn buckets() {
        assert_eq!(strength_bucket(33.0), "low");
        assert_eq!(strength_bucket(50.0), "medium");
        assert_eq!(strength_bucket(66.1), "high");
        assert_eq!(size_bucket(0.19), "tiny");
        assert_eq!(size_bucket(0.55), "big");
        assert_eq!(size_bucket(2.0), "huge");
        assert_eq!(size_group("pot"), "large");
    }

    #[test]
    fn detailed_mapping_wins() {
        let book = book_with(
            "flop",
            "cbet",
            r#"{"detailed_mappings": {"high": {"big": "strong-cbet"}},
                "strength_mappings": {"high": {"large": "value-lean"}}}"#,
        );
        assert_eq!(book.intention("flop", "cbet", 80.0, 60, 100), "strong-cbet");
    }

    #[test]
    fn grouped_mapping_is_the_fallback() {
        let book = book_with(
            "flop",
            "cbet",
            r#"{"strength_mappings": {"high": {"large": "value-lean"}}}"#,
        );
        assert_eq!(book.intention("flop", "cbet", 80.0, 60, 100), "value-lean");
    }

    #[test]
    fn generic_raise_file_backs_missing_labels() {
        let book = book_with(
            "turn",
            "raise",
            r#"{"strength_mappings": {"low": {"large": "bluff-lean"}}}"#,
        );
        assert_eq!(book.intention("turn", "donk", 10.0, 90, 100), "bluff-lean");
    }

    #[test]
    fn unresolved_composes_label_strength_size() {
        let book = IntentionBook::empty();
        assert_eq!(
            book.intention("river", "checkraise", 50.0, 120, 100),
            "checkraise-medium-over"
        );
    }

    #[test]
    fn fixed_intents_for_passive_lines() {
        let book = IntentionBook::empty();
        assert_eq!(book.intention("flop", "check", 90.0, 0, 100), "check");
        assert_eq!(book.intention("river", "call", 80.0, 50, 100), "call-strong");
        assert_eq!(book.intention("river", "fold", 20.0, 0, 100), "fold-weak");
        assert_eq!(book.intention("turn", "call", 50.0, 50, 100), "call-medium");
    }
}
