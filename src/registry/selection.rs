//! Counter-based instance selection.

use std::sync::atomic::{AtomicU64, Ordering};

/// Spreads lookups across candidates with one shared counter.
///
/// Every selection, for any application, advances the same counter and takes
/// it modulo the candidate count. Over many calls this visits every candidate
/// evenly; concurrent lookups against different applications interleave, so
/// it is not a strict per-application round robin.
#[derive(Debug, Default)]
pub struct SelectionCounter {
    counter: AtomicU64,
}

impl SelectionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick an index in `0..count`, or `None` when there is nothing to pick.
    pub fn next_index(&self, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }
        let ticket = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        // count fits in u64 and the remainder is below count, so both casts are lossless.
        Some((ticket % count as u64) as usize)
    }

    /// Pick one value from an ordered collection.
    pub fn pick<T, I>(&self, candidates: I) -> Option<T>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        let mut iter = candidates.into_iter();
        let index = self.next_index(iter.len())?;
        iter.nth(index)
    }
}
