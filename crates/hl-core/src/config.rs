//! Line-oriented `KEY=VALUE` configuration.
//!
//! Recognized keys: `BASE_URL`, `ORGANIZER`, `EVENT`, `STARTING_DATE`,
//! `BATCH_SIZE`, `BATCH_LIMIT`, `RANGES_PATH`, `NORMALIZE_CUR`. Unknown keys
//! are ignored so the file can carry deployment-specific extras.
use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

/// Fatal configuration problem. The binary maps this to exit code 1.
#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.0)
    }
}
impl std::error::Error for ConfigError {}

/// Upstream API credentials, read from the environment.
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Reads `BATTLE_API_USERNAME` and `BATTLE_API_PASSWORD`. Both must be
    /// set and non-empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let username = std::env::var("BATTLE_API_USERNAME").unwrap_or_default();
        let password = std::env::var("BATTLE_API_PASSWORD").unwrap_or_default();
        if username.is_empty() || password.is_empty() {
            return Err(ConfigError(
                "BATTLE_API_USERNAME and BATTLE_API_PASSWORD must be set".into(),
            ));
        }
        Ok(Self { username, password })
    }
}

/// Parsed contents of `config.txt`.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub organizer: String,
    pub event: String,
    pub starting_date: String,
    pub batch_size: usize,
    pub page_limit: usize,
    pub ranges_path: PathBuf,
    pub normalize_cur: bool,
}

impl Config {
    /// Loads and validates the configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError(format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(&text)
    }

    /// Parses `KEY=VALUE` lines. Keys are case-insensitive, values trimmed.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let kv = text
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.trim().to_uppercase(), v.trim().to_string()))
            .collect::<HashMap<String, String>>();
        let require = |key: &str| {
            kv.get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| ConfigError(format!("missing {} in config", key)))
        };
        let starting_date = require("STARTING_DATE")?;
        if chrono::NaiveDate::parse_from_str(&starting_date, "%Y-%m-%d").is_err() {
            return Err(ConfigError(format!(
                "STARTING_DATE '{}' is not YYYY-MM-DD",
                starting_date
            )));
        }
        Ok(Self {
            base_url: require("BASE_URL")?.trim_end_matches('/').to_string(),
            organizer: require("ORGANIZER")?,
            event: require("EVENT")?,
            starting_date,
            batch_size: kv
                .get("BATCH_SIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(crate::DEFAULT_BATCH_SIZE),
            page_limit: kv
                .get("BATCH_LIMIT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(crate::DEFAULT_PAGE_LIMIT),
            ranges_path: kv
                .get("RANGES_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("assets/ranges/poker_ranges.db")),
            normalize_cur: kv
                .get("NORMALIZE_CUR")
                .map(|v| v.eq_ignore_ascii_case("y"))
                .unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
BASE_URL=https://api.example.com/
ORGANIZER=org1
EVENT=main
STARTING_DATE=2025-01-10
BATCH_SIZE=250
SOME_FUTURE_OPTION=whatever
";

    #[test]
    fn parses_known_keys_and_ignores_unknown() {
        let cfg = Config::parse(SAMPLE).unwrap();
        assert_eq!(cfg.base_url, "https://api.example.com");
        assert_eq!(cfg.organizer, "org1");
        assert_eq!(cfg.batch_size, 250);
        assert_eq!(cfg.page_limit, crate::DEFAULT_PAGE_LIMIT);
        assert!(!cfg.normalize_cur);
    }

    #[test]
    fn rejects_bad_starting_date() {
        let text = SAMPLE.replace("2025-01-10", "not-a-date");
        assert!(Config::parse(&text).is_err());
    }

    #[test]
    fn normalize_flag_is_case_insensitive() {
        let text = format!("{}NORMALIZE_CUR=y\n", SAMPLE);
        assert!(Config::parse(&text).unwrap().normalize_cur);
    }
}
