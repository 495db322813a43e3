//! View statistics.
//!
//! Two kinds of numbers are kept:
//! - [`UpdateStats`] describes a single index update pass and is returned
//!   by [`View::update_index`](crate::View::update_index).
//! - [`ViewStats`] accumulates counters over the lifetime of a view handle.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome of one index update pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateStats {
    /// Watermark before the pass.
    pub from_sequence: u64,
    /// Watermark after the pass.
    pub to_sequence: u64,
    /// Index rows removed.
    pub rows_deleted: u64,
    /// Index rows added.
    pub rows_inserted: u64,
    /// Documents the map function was applied to.
    pub documents_mapped: u64,
    /// Documents whose map invocation failed.
    pub map_failures: u64,
}

impl UpdateStats {
    /// Stats of a pass that found nothing to do.
    pub(crate) fn unchanged(sequence: u64) -> Self {
        Self {
            from_sequence: sequence,
            to_sequence: sequence,
            ..Self::default()
        }
    }

    /// Returns true if the pass did not touch the index.
    pub fn is_noop(&self) -> bool {
        self.from_sequence == self.to_sequence
            && self.rows_deleted == 0
            && self.rows_inserted == 0
    }
}

/// Cumulative counters for a view.
///
/// All counters are atomic and can be read while updates are running.
#[derive(Debug, Default)]
pub struct ViewStats {
    /// Update passes that changed the index.
    updates: AtomicU64,
    /// Rows emitted by the map function.
    rows_emitted: AtomicU64,
    /// Failed map invocations.
    map_failures: AtomicU64,
    /// Queries run.
    queries: AtomicU64,
}

impl ViewStats {
    /// Creates zeroed stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a finished update pass.
    pub(crate) fn record_update(&self, update: &UpdateStats) {
        if update.is_noop() {
            return;
        }
        self.updates.fetch_add(1, Ordering::Relaxed);
        self.rows_emitted
            .fetch_add(update.rows_inserted, Ordering::Relaxed);
        self.map_failures
            .fetch_add(update.map_failures, Ordering::Relaxed);
    }

    /// Records a query.
    pub(crate) fn record_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of update passes that changed the index.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// Returns the number of rows emitted.
    pub fn rows_emitted(&self) -> u64 {
        self.rows_emitted.load(Ordering::Relaxed)
    }

    /// Returns the number of failed map invocations.
    pub fn map_failures(&self) -> u64 {
        self.map_failures.load(Ordering::Relaxed)
    }

    /// Returns the number of queries run.
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_updates_are_not_counted() {
        let stats = ViewStats::new();
        stats.record_update(&UpdateStats::unchanged(5));
        assert_eq!(stats.updates(), 0);

        stats.record_update(&UpdateStats {
            from_sequence: 5,
            to_sequence: 8,
            rows_inserted: 3,
            map_failures: 1,
            ..UpdateStats::default()
        });
        assert_eq!(stats.updates(), 1);
        assert_eq!(stats.rows_emitted(), 3);
        assert_eq!(stats.map_failures(), 1);
    }

    #[test]
    fn query_counter() {
        let stats = ViewStats::new();
        stats.record_query();
        stats.record_query();
        assert_eq!(stats.queries(), 2);
    }
}
