//! Embedded stores for the ingestion pipeline.
//!
//! Two single-file SQLite databases back the system: the append-only
//! primary store (raw hand JSON) and the analytic store (derived tables).
//! A third, read-only reference database holds the prebuilt preflop ranges.
//!
//! ## Stores
//!
//! - [`Primary`] — raw hands, hand meta, partial scores
//! - [`Analytic`] — normalized + materialized tables, indexes, pragmas
//! - [`Ranges`] — solver reference lookups
//!
//! ## Coordination
//!
//! - [`DbLock`] — exclusive writer lock (`<db>.lock`, O_EXCL semantics)
//! - [`BuildLock`] — materializer in-progress marker
//! - [`archive`] — daily rotation into `archive/{date}/`
mod analytic;
mod lock;
mod primary;
mod ranges;

pub mod archive;

pub use analytic::Analytic;
pub use lock::BuildLock;
pub use lock::DbLock;
pub use primary::HandRow;
pub use primary::MetaRow;
pub use primary::Primary;
pub use primary::RawHand;
pub use ranges::NodeLookup;
pub use ranges::Ranges;

/// Table for raw hand JSON keyed by hand id.
#[rustfmt::skip]
pub const HANDS:             &str = "hands";
/// Table for per-hand metadata derived at ingest.
#[rustfmt::skip]
pub const HAND_META:         &str = "hand_meta";
/// Table for solver-supplied per-node score JSON.
#[rustfmt::skip]
pub const PARTIAL_SCORES:    &str = "partial_scores";
/// Table for normalized hand headers.
#[rustfmt::skip]
pub const HAND_INFO:         &str = "hand_info";
/// Table for per-street community boards.
#[rustfmt::skip]
pub const STREETS:           &str = "streets";
/// Table for per-hand seat snapshots.
#[rustfmt::skip]
pub const PLAYERS:           &str = "players";
/// Table for positioned per-action rows.
#[rustfmt::skip]
pub const ACTIONS:           &str = "actions";
/// Table for postflop node scores.
#[rustfmt::skip]
pub const POSTFLOP_SCORES:   &str = "postflop_scores";
/// Table for preflop solver match results.
#[rustfmt::skip]
pub const PREFLOP_SCORES:    &str = "preflop_scores";
/// Materialized single-row dashboard aggregates.
#[rustfmt::skip]
pub const DASHBOARD_SUMMARY: &str = "dashboard_summary";
/// Materialized top-players table.
#[rustfmt::skip]
pub const TOP25_PLAYERS:     &str = "top25_players";
/// Materialized per-player summary.
#[rustfmt::skip]
pub const PLAYER_SUMMARY:    &str = "player_summary";
/// Reference table inside the ranges database.
#[rustfmt::skip]
pub const RANGES_FLAT:       &str = "ranges_flat";

/// Applies the engine pragmas shared by both writable stores: write-ahead
/// logging, relaxed sync, a 30 s busy timeout, and a 64 MB page cache.
pub(crate) fn tune(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "journal_size_limit", 50_000_000)?;
    conn.busy_timeout(hl_core::BUSY_TIMEOUT)?;
    conn.pragma_update(None, "cache_size", -65536)?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    Ok(())
}

/// Truncating WAL checkpoint; called on graceful shutdown.
pub fn checkpoint(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE)")
}

/// Opens a database just long enough to checkpoint its write-ahead log.
pub fn checkpoint_file(path: &std::path::Path) -> anyhow::Result<()> {
    let conn = rusqlite::Connection::open(path)?;
    checkpoint(&conn)?;
    Ok(())
}
