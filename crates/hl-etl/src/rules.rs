//! Declarative action-label rules.
//!
//! The rule file is an external asset so poker-knowledge edits don't need a
//! recompile. Rules are consulted in priority order; the first match whose
//! conditions all hold supplies the label. When no rule matches (or the
//! file is absent) the labeler's built-in ordinal behavior applies.
use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<Rule>,
}

/// One labeling rule. `when` keys are compared for equality against the
/// labeler's context; `result_template` may reference context keys as
/// `{key}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub when: HashMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub result_template: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i64,
}

fn default_priority() -> i64 {
    9999
}

/// A priority-sorted rule set.
#[derive(Debug, Clone, Default)]
pub struct LabelRules {
    rules: Vec<Rule>,
}

impl LabelRules {
    /// Loads the rule file, falling back to the built-in behavior when it
    /// is missing or unreadable.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match Self::parse(&text) {
                Ok(rules) => {
                    log::info!("loaded {} label rules from {}", rules.rules.len(), path.display());
                    rules
                }
                Err(e) => {
                    log::warn!("bad rule file {}: {}, using built-in labels", path.display(), e);
                    Self::fallback()
                }
            },
            Err(_) => {
                log::info!("no rule file at {}, using built-in labels", path.display());
                Self::fallback()
            }
        }
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let file: RuleFile = serde_yaml::from_str(text)?;
        let mut rules = file.rules;
        rules.sort_by_key(|r| r.priority);
        Ok(Self { rules })
    }

    /// No declarative rules; every label comes from the built-in machine.
    pub fn fallback() -> Self {
        Self::default()
    }

    fn scope_matches(scope: Option<&str>, street: &str) -> bool {
        let street_up = street.to_uppercase();
        match scope.map(str::to_uppercase).as_deref() {
            None | Some("ANY") => true,
            Some("POSTFLOP") => street_up != "PREFLOP",
            Some(s) => s == street_up,
        }
    }

    /// First matching rule's label for the given context, if any.
    pub fn resolve(
        &self,
        street: &str,
        ctx: &HashMap<&'static str, serde_yaml::Value>,
    ) -> Option<String> {
        for rule in &self.rules {
            if !Self::scope_matches(rule.scope.as_deref(), street) {
                continue;
            }
            let holds = rule
                .when
                .iter()
                .all(|(key, expected)| ctx.get(key.as_str()) == Some(expected));
            if !holds {
                continue;
            }
            if let Some(result) = &rule.result {
                if !result.is_empty() {
                    return Some(result.clone());
                }
            }
            if let Some(template) = &rule.result_template {
                let mut out = template.clone();
                for (key, value) in ctx {
                    let text = match value {
                        serde_yaml::Value::String(s) => s.clone(),
                        serde_yaml::Value::Number(n) => n.to_string(),
                        serde_yaml::Value::Bool(b) => b.to_string(),
                        _ => continue,
                    };
                    out = out.replace(&format!("{{{}}}", key), &text);
                }
                if !out.is_empty() {
                    return Some(out);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULESET: &str = "
rules:
  - scope: PREFLOP
    when: { kind: raise, ordinal: 2 }
    result: 3bet
    priority: 10
  - scope: POSTFLOP
    when: { kind: raise, is_first_bet: true }
    result_template: \"{street}-lead\"
    priority: 20
";

    fn ctx(pairs: &[(&'static str, serde_yaml::Value)]) -> HashMap<&'static str, serde_yaml::Value> {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn equality_conditions_and_scope() {
        let rules = LabelRules::parse(RULESET).unwrap();
        let preflop = ctx(&[
            ("kind", "raise".into()),
            ("ordinal", serde_yaml::Value::from(2i64)),
        ]);
        assert_eq!(rules.resolve("preflop", &preflop), Some("3bet".into()));
        assert_eq!(rules.resolve("flop", &preflop), None);
        let open = ctx(&[
            ("kind", "raise".into()),
            ("ordinal", serde_yaml::Value::from(1i64)),
        ]);
        assert_eq!(rules.resolve("preflop", &open), None);
    }

    #[test]
    fn templates_substitute_context() {
        let rules = LabelRules::parse(RULESET).unwrap();
        let flop = ctx(&[
            ("kind", "raise".into()),
            ("is_first_bet", true.into()),
            ("street", "flop".into()),
        ]);
        assert_eq!(rules.resolve("flop", &flop), Some("flop-lead".into()));
    }

    #[test]
    fn shipped_asset_parses() {
        let text = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../../assets/action_rules.yml"
        ));
        let rules = LabelRules::parse(text).unwrap();
        assert!(!rules.rules.is_empty());
    }
}
