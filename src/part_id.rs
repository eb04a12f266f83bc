//! Globally ordered opaque part identifiers.
//!
//! A part id is `part_<12-hex-ms-timestamp>_<4-hex-counter>`. Both segments
//! are fixed-width zero-padded hex, so lexicographic string comparison equals
//! numeric comparison. The counter strictly increases per process, which
//! keeps two ids generated within the same millisecond ordered. Ids from
//! independent processes are not ordered against each other; a message is
//! owned by one process, so that never matters here.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::clock::now_ms;

/// Opaque identifier that sorts lexicographically in creation order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartId(String);

impl PartId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wraps a raw id string. Intended for tests and deserialization paths
    /// that replay previously generated ids.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

static PART_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_counter() -> u64 {
    PART_ID_COUNTER.fetch_add(1, Ordering::SeqCst) & 0xffff
}

/// Creates an id that sorts after every id previously created in this
/// process.
#[must_use]
pub fn create_part_id() -> PartId {
    let millis = now_ms().max(0) as u64 & 0xffff_ffff_ffff;
    PartId(format!("part_{millis:012x}_{:04x}", next_counter()))
}

/// Creates an id for an ordered insert near an anchor part.
///
/// With `Some(anchor)` the id sorts immediately after the anchor and before
/// any id created later, so a sorted insert lands the part right behind its
/// anchor even when later parts already exist. With `None` the id sorts
/// before every normally created id, for inserts at the head of a branch.
/// Uniqueness still comes from the process counter.
#[must_use]
pub fn create_anchored_part_id(anchor: Option<&PartId>) -> PartId {
    match anchor {
        // '.' sorts below every character used by normal ids, so the suffix
        // never overtakes a later sibling that shares the anchor prefix.
        Some(anchor) => PartId(format!("{}.{:04x}", anchor.0, next_counter())),
        None => PartId(format!("part_000000000000_{:04x}", next_counter())),
    }
}

/// Resets the process-wide sequence counter. Test use only.
pub fn reset_part_id_counter() {
    PART_ID_COUNTER.store(0, Ordering::SeqCst);
}
