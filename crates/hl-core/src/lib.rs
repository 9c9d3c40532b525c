//! Core type aliases, constants, and runtime utilities for handline.
//!
//! This crate provides the foundational types and configuration parameters
//! used throughout the handline workspace.
#![allow(dead_code)]

pub mod config;
pub mod paths;

pub use config::Config;
pub use config::ConfigError;
pub use config::Credentials;
pub use paths::Paths;

// ============================================================================
// TYPE ALIASES
// ============================================================================
/// Stack sizes, bet amounts, and pot totals in chips.
pub type Chips = i64;
/// Hand-strength and decision scores on the 1-100 scale.
pub type Score = f64;
/// Solver action frequencies and probabilities.
pub type Frequency = f64;
/// Upstream pagination sequence number (offset + index).
pub type Seq = i64;

// ============================================================================
// TRAITS
// ============================================================================
/// Random instance generation for testing.
pub trait Arbitrary {
    /// Generate a uniformly random instance.
    fn random() -> Self;
}

// ============================================================================
// TABLE GEOMETRY
// ============================================================================
/// Canonical seat order for up to 9-handed tables. A hand's seats are this
/// list filtered to the positions present, preserving order. Preflop action
/// starts at the first remaining seat (left of BB).
pub const SEAT_ORDER: [&str; 9] = [
    "UTG", "UTG1", "UTG2", "LJ", "HJ", "CO", "BTN", "SB", "BB",
];

/// 6-max ordering used for IP/OOP computation. The first slot aliases
/// UTG and LJ, which the solver reference treats as the same seat.
pub const ORDER_6MAX: [&str; 6] = ["UTG/LJ", "HJ", "CO", "BTN", "SB", "BB"];

// ============================================================================
// INGESTION PARAMETERS
// ============================================================================
/// Hands accumulated before a batch commit + pipeline run.
pub const DEFAULT_BATCH_SIZE: usize = 500;
/// Upstream page size (limit query parameter).
pub const DEFAULT_PAGE_LIMIT: usize = 50;
/// Seconds to sleep between date iterations.
pub const DEFAULT_SLEEP_SECS: u64 = 300;
/// Seconds to sleep once the loop has caught up to today.
pub const CAUGHT_UP_SLEEP_SECS: u64 = 600;
/// Per-request timeout against the upstream API.
pub const REQUEST_TIMEOUT_SECS: u64 = 60;
/// Timeout for the login handshake.
pub const LOGIN_TIMEOUT_SECS: u64 = 20;

// ============================================================================
// PIPELINE PARAMETERS
// ============================================================================
/// Rows per insert batch in the preflop matcher (500 hands x 6 seats).
pub const PREFLOP_BATCH_ROWS: usize = 3000;
/// Rows per UPDATE batch in the enrichment stages.
pub const UPDATE_BATCH_ROWS: usize = 5000;
/// Rows per UPDATE batch in the intention mapper.
pub const INTENTION_BATCH_ROWS: usize = 500;
/// Hands between commits in the hand builder.
pub const BUILDER_COMMIT_EVERY: usize = 200;
/// Absolute tolerance when comparing solver frequencies.
pub const FREQ_TOLERANCE: f64 = 1e-9;
/// Maximum wait for the per-database write lock.
pub const LOCK_WAIT: std::time::Duration = std::time::Duration::from_secs(600);
/// Poll interval while waiting on the write lock.
pub const LOCK_POLL: std::time::Duration = std::time::Duration::from_millis(250);
/// SQLite busy timeout.
pub const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

// ============================================================================
// RUNTIME UTILITIES
// ============================================================================
/// Initialize dual logging (terminal + file) with a timestamped log file.
/// Writes DEBUG level to `{dir}/import_{YYYYMMDD_HHMMSS}.log`, INFO to the
/// terminal. Call once at process start.
pub fn log(dir: &std::path::Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)?;
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_target_level(log::LevelFilter::Off)
        .set_thread_level(log::LevelFilter::Off)
        .build();
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let file = simplelog::WriteLogger::new(
        log::LevelFilter::Debug,
        config.clone(),
        std::fs::File::create(dir.join(format!("import_{}.log", stamp)))?,
    );
    let term = simplelog::TermLogger::new(
        log::LevelFilter::Info,
        config.clone(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
    simplelog::CombinedLogger::init(vec![term, file])?;
    Ok(())
}

/// Global interrupt flag for graceful shutdown coordination.
static INTERRUPTED: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

/// Check whether a termination signal has been received. The driver polls
/// this at batch boundaries and between dates.
pub fn interrupted() -> bool {
    INTERRUPTED.load(std::sync::atomic::Ordering::Relaxed)
}

/// Register the SIGINT/SIGTERM handler. First signal requests a graceful
/// stop at the next batch boundary; a second one exits immediately.
pub fn trap() {
    ctrlc::set_handler(|| {
        if INTERRUPTED.swap(true, std::sync::atomic::Ordering::Relaxed) {
            log::warn!("second interrupt, exiting immediately");
            std::process::exit(1);
        }
        log::warn!("interrupt received, finishing current batch");
    })
    .expect("install signal handler");
}
