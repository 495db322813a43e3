//! Change notifications for committed document writes.
//!
//! The feed is how live queries learn that the database moved on. Events
//! are delivered after the write that produced them is visible to readers,
//! to callbacks registered with [`ChangeFeed::observe`].

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A committed document change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Sequence assigned to the new revision.
    pub sequence: u64,
    /// Document ID.
    pub doc_id: String,
    /// New revision ID.
    pub rev_id: String,
    /// Whether the revision deletes the document.
    pub deleted: bool,
}

/// Handle identifying a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Distributes change events to observers.
pub struct ChangeFeed {
    observers: RwLock<Vec<(ObserverId, Observer)>>,
    next_observer: AtomicU64,
}

impl ChangeFeed {
    /// Creates an empty change feed.
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
            next_observer: AtomicU64::new(1),
        }
    }

    /// Registers a callback invoked for every future event.
    ///
    /// Callbacks run synchronously on the thread that emitted the event and
    /// must not block.
    pub fn observe<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::SeqCst));
        self.observers.write().push((id, Arc::new(callback)));
        id
    }

    /// Removes an observer. Returns whether it was registered.
    pub fn unobserve(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    /// Emits a change event to all observers.
    pub fn emit(&self, event: ChangeEvent) {
        // Snapshot observers so a callback may unobserve itself.
        let observers: Vec<Observer> = self
            .observers
            .read()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in observers {
            callback(&event);
        }
    }

    /// Returns the number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("observers", &self.observer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn event(sequence: u64) -> ChangeEvent {
        ChangeEvent {
            sequence,
            doc_id: format!("doc{sequence}"),
            rev_id: format!("1-{sequence}"),
            deleted: false,
        }
    }

    #[test]
    fn observers_run_until_removed() {
        let feed = ChangeFeed::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let id = feed.observe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        feed.emit(event(1));
        feed.emit(event(2));
        assert!(feed.unobserve(id));
        assert!(!feed.unobserve(id));
        feed.emit(event(3));

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(feed.observer_count(), 0);
    }

    #[test]
    fn observer_may_remove_itself() {
        let feed = Arc::new(ChangeFeed::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let id = Arc::new(parking_lot::Mutex::new(None));
        let (weak_feed, counter, slot) = (Arc::downgrade(&feed), Arc::clone(&hits), Arc::clone(&id));
        *id.lock() = Some(feed.observe(move |event| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let (Some(feed), Some(id)) = (weak_feed.upgrade(), *slot.lock()) {
                feed.unobserve(id);
            }
            assert_eq!(event.doc_id, "doc1");
        }));

        feed.emit(event(1));
        feed.emit(event(2));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(feed.observer_count(), 0);
    }
}
