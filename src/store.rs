//! Sorted upsert store over a message's part array.
//!
//! The array is the single source of truth and stays strictly sorted by part
//! id. Callers hand the array in by value and get a new value back, so a
//! caller holding an older snapshot never observes an in-place mutation.

use crate::part::Part;
use crate::part_id::PartId;

/// Binary search over the id sort key.
///
/// `Ok` carries the match index; `Err` carries the insertion index that
/// preserves sort order.
pub fn binary_search_by_id(parts: &[Part], id: &PartId) -> Result<usize, usize> {
    parts.binary_search_by(|part| part.id().cmp(id))
}

/// Replaces the part with a matching id at its existing position, or inserts
/// the part at the position that preserves ascending id order.
#[must_use]
pub fn upsert_part(mut parts: Vec<Part>, part: Part) -> Vec<Part> {
    match binary_search_by_id(&parts, part.id()) {
        Ok(index) => parts[index] = part,
        Err(index) => parts.insert(index, part),
    }

    parts
}

/// Reverse scan for the last part matching a predicate.
pub fn find_last_part_index<F>(parts: &[Part], predicate: F) -> Option<usize>
where
    F: Fn(&Part) -> bool,
{
    parts.iter().rposition(predicate)
}
