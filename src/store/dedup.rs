//! Bulk ingestion dedup

use std::collections::HashSet;

/// Outcome of a bulk append
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkAppend {
    /// Values written, one record each
    pub stored: usize,
    /// Values dropped as duplicates
    pub skipped: usize,
}

/// Order-preserving dedup on raw bytes. The first occurrence of a value
/// wins; any value equal to an item of `against` is dropped entirely.
pub(crate) fn dedup<'a, V, A>(values: &'a [V], against: &[A]) -> Vec<&'a [u8]>
where
    V: AsRef<[u8]>,
    A: AsRef<[u8]>,
{
    let mut seen: HashSet<&[u8]> = against.iter().map(|a| a.as_ref()).collect();
    let mut kept = Vec::with_capacity(values.len());
    for value in values {
        let value = value.as_ref();
        if seen.insert(value) {
            kept.push(value);
        }
    }

    debug_assert!(kept.len() <= values.len(), "Postcondition: dedup never adds values");
    kept
}
