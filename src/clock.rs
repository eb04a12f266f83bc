//! Timestamp helpers shared by the part model and the reducer.
//!
//! Adapters report provider timestamps as RFC 3339 strings; everything the
//! engine computes with them is unix milliseconds. Unparsable input is never
//! an error here, callers degrade to a zero duration.

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Unix epoch milliseconds.
pub type UnixMillis = i64;

/// Returns the current wall-clock time in unix milliseconds.
#[must_use]
pub fn now_ms() -> UnixMillis {
    let now = OffsetDateTime::now_utc();
    (now.unix_timestamp_nanos() / 1_000_000) as UnixMillis
}

/// Parses an RFC 3339 timestamp into unix milliseconds.
///
/// Returns `None` for anything unparsable; callers treat that as an unknown
/// instant rather than a failure.
#[must_use]
pub fn parse_timestamp_ms(raw: &str) -> Option<UnixMillis> {
    let parsed = OffsetDateTime::parse(raw.trim(), &Rfc3339).ok()?;
    Some((parsed.unix_timestamp_nanos() / 1_000_000) as UnixMillis)
}
