use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use tracing::debug;

/// Byte-level progress tracking for a single download or a whole batch.
///
/// The transfer callback (producer) and the progress display (consumer) run
/// on the same thread, so the counters use `Cell`s and every method takes
/// `&self`. Transfers report *cumulative* byte counts per item; the
/// aggregator remembers the last cumulative value it saw for each active
/// item and only ever adds the difference.
///
/// # Examples
///
/// ```
/// use ytmenu::ProgressAggregator;
///
/// let progress = ProgressAggregator::new();
/// progress.begin(100);
/// progress.observe(0, 40);
/// progress.observe(0, 100);
/// assert_eq!(progress.snapshot().bytes_done, 100);
/// ```
#[derive(Debug, Default)]
pub struct ProgressAggregator {
    bytes_total: Cell<u64>,
    bytes_done: Cell<u64>,
    finished: Cell<bool>,
    last_seen: RefCell<HashMap<usize, u64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub bytes_done: u64,
    pub bytes_total: u64,
    pub finished: bool,
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new operation of `total_bytes`, dropping all previous state.
    pub fn begin(&self, total_bytes: u64) {
        self.bytes_total.set(total_bytes);
        self.bytes_done.set(0);
        self.finished.set(false);
        self.last_seen.borrow_mut().clear();
    }

    /// Adds an incremental amount, never going past the total.
    pub fn advance(&self, delta_bytes: u64) {
        let done = self
            .bytes_done
            .get()
            .saturating_add(delta_bytes)
            .min(self.bytes_total.get());
        self.bytes_done.set(done);
    }

    /// Feeds the cumulative byte count of `item` and returns the delta
    /// applied. A cumulative value below the last one seen adds nothing.
    pub fn observe(&self, item: usize, cumulative: u64) -> u64 {
        let mut last_seen = self.last_seen.borrow_mut();
        let last = last_seen.entry(item).or_insert(0);
        let delta = cumulative.saturating_sub(*last);
        *last = (*last).max(cumulative);
        drop(last_seen);

        if delta > 0 {
            self.advance(delta);
        }
        delta
    }

    /// Tops `item` up to its `expected` size and stops tracking it.
    pub fn complete_item(&self, item: usize, expected: u64) {
        let last = self.last_seen.borrow_mut().remove(&item).unwrap_or(0);
        if expected > last {
            debug!(item, shortfall = expected - last, "topping up item");
            self.advance(expected - last);
        }
    }

    /// Forces `bytes_done` to `bytes_total`. Safe to call repeatedly.
    pub fn finish(&self) {
        self.bytes_done.set(self.bytes_total.get());
        self.finished.set(true);
        self.last_seen.borrow_mut().clear();
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            bytes_done: self.bytes_done.get(),
            bytes_total: self.bytes_total.get(),
            finished: self.finished.get(),
        }
    }
}

/// RAII guard that finishes the aggregator when dropped
///
/// Holding one across a transfer makes the terminal update run on every exit
/// path, including early returns and a cancelled future.
pub struct FinishGuard<'a> {
    progress: &'a ProgressAggregator,
}

impl<'a> FinishGuard<'a> {
    pub fn new(progress: &'a ProgressAggregator) -> Self {
        Self { progress }
    }
}

impl<'a> Drop for FinishGuard<'a> {
    fn drop(&mut self) {
        self.progress.finish();
    }
}
