//! Upstream hand-history API client.
//!
//! A blocking, cookie-carrying session performs the CSRF login handshake
//! and exposes a lazy paginated iterator over the hands of one calendar
//! date. Hand payloads are kept permissive: fields vary across upstream
//! versions, so [`Record`] consults candidate keys in priority order and
//! parses numerics defensively.
mod client;
mod record;

pub use client::AuthError;
pub use client::HandsForDate;
pub use client::Session;
pub use record::Record;
pub use record::Seat;
