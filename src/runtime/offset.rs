use std::sync::atomic::{AtomicU64, Ordering};

/// Tracks how many result items the session has consumed for its query.
///
/// Within a run the cursor only moves forward: it advances by the item
/// count of each processed page, so no item is fetched or rendered twice.
#[derive(Debug)]
pub struct OffsetCursor {
    consumed: AtomicU64,
}

impl OffsetCursor {
    pub fn new(start: u64) -> Self {
        Self {
            consumed: AtomicU64::new(start),
        }
    }

    /// Advances past `count` freshly rendered items and returns the new offset.
    pub fn advance(&self, count: u64) -> u64 {
        self.consumed.fetch_add(count, Ordering::SeqCst) + count
    }

    pub fn current(&self) -> u64 {
        self.consumed.load(Ordering::SeqCst)
    }

    /// Rewinds the cursor to a fresh start. Only valid between runs; within
    /// a run the cursor never moves backwards.
    pub(crate) fn reset(&self, start: u64) {
        self.consumed.store(start, Ordering::SeqCst);
    }
}
