use std::path::PathBuf;

use clap::Parser;

/// Day-by-day hand-history scraper and enrichment pipeline.
#[derive(Debug, Parser)]
#[command(name = "ingest", version, about)]
pub struct Cli {
    /// Start date (YYYY-MM-DD); defaults to STARTING_DATE from config.
    pub date: Option<String>,

    /// Override the upstream base URL.
    #[arg(long)]
    pub url: Option<String>,

    /// Override the primary database path.
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Seconds to sleep between date iterations.
    #[arg(long, default_value_t = hl_core::DEFAULT_SLEEP_SECS)]
    pub sleep: u64,

    /// Stage names to skip (e.g. --skip-scripts preflop intention).
    #[arg(long = "skip-scripts", num_args = 0..)]
    pub skip_scripts: Vec<String>,

    /// Skip all post-ingest stages.
    #[arg(long = "no-scripts")]
    pub no_scripts: bool,

    /// Skip the initial cleanup.
    #[arg(long = "no-clean")]
    pub no_clean: bool,

    /// Rescale joined score columns onto 0-100.
    #[arg(long)]
    pub normalize: bool,

    /// Archive both databases after each finished day.
    #[arg(long)]
    pub rotate: bool,

    /// Configuration file.
    #[arg(long, default_value = "config.txt")]
    pub config: PathBuf,

    /// Directory holding the rule and intention assets.
    #[arg(long, default_value = "assets")]
    pub assets: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_documented_surface() {
        let cli = Cli::parse_from([
            "ingest",
            "2025-01-10",
            "--url",
            "https://api.example.com",
            "--sleep",
            "60",
            "--skip-scripts",
            "preflop",
            "intention",
            "--no-clean",
        ]);
        assert_eq!(cli.date.as_deref(), Some("2025-01-10"));
        assert_eq!(cli.sleep, 60);
        assert_eq!(cli.skip_scripts, ["preflop", "intention"]);
        assert!(cli.no_clean);
        assert!(!cli.no_scripts);
    }
}
