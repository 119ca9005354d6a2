//! Timestamp helpers for the database layer.
//!
//! Timestamps are stored as RFC 3339 UTC strings (`TEXT` columns). The
//! microsecond format keeps a fixed width so lexicographic ordering matches
//! chronological ordering.

use chrono::{DateTime, SecondsFormat, Utc};

/// Current time as an RFC 3339 UTC string with microsecond precision.
#[inline]
pub fn now_rfc3339() -> String {
    to_rfc3339(Utc::now())
}

/// Format a `DateTime<Utc>` as an RFC 3339 UTC string.
#[inline]
pub fn to_rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored RFC 3339 string back into a `DateTime<Utc>`.
///
/// Empty or malformed values decode to the Unix epoch; rows written by this
/// service always round-trip.
#[inline]
pub fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}
