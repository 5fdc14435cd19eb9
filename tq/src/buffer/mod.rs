//! Ordered task buffers
//!
//! A buffer holds work that has been submitted but not yet started. Entries are
//! kept in descending priority order; entries with equal priority keep their
//! submission order.
//!
//! [`PriorityBuffer`] is the single ordering implementation. Identity tracking
//! for de-duplication is layered on top of any buffer by [`TrackedBuffer`].

mod priority;
mod tracked;

pub use priority::PriorityBuffer;
pub use tracked::TrackedBuffer;

/// A queued, not-yet-started unit of work
#[derive(Debug)]
pub struct Entry<T, K> {
    pub priority: i32,
    pub id: Option<K>,
    pub item: T,
}

impl<T, K> Entry<T, K> {
    pub fn new(item: T, priority: i32, id: Option<K>) -> Self {
        Self { priority, id, item }
    }
}

/// Storage for queued work, ordered by priority
///
/// The task queue is generic over this trait, so alternative buffers can be
/// plugged in at construction time.
pub trait TaskBuffer<T, K>: Default + Send + 'static {
    /// Insert an item behind every queued entry of equal or higher priority
    fn enqueue(&mut self, item: T, priority: i32, id: Option<K>);

    /// Remove the head entry
    fn dequeue_entry(&mut self) -> Option<Entry<T, K>>;

    /// Number of queued entries
    fn size(&self) -> usize;

    /// Remove and return the head item
    fn dequeue(&mut self) -> Option<T> {
        self.dequeue_entry().map(|entry| entry.item)
    }

    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Reset to a fresh buffer, dropping every queued entry
    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Identity queries answered by buffers that track entry ids
pub trait IdentityIndex<K> {
    /// An entry with this id is queued and has not been dequeued yet
    fn is_pending(&self, id: &K) -> bool;

    /// An entry with this id has been dequeued at least once
    fn is_processed(&self, id: &K) -> bool;

    /// The id is either still queued or has already been started
    fn is_inserted(&self, id: &K) -> bool {
        self.is_pending(id) || self.is_processed(id)
    }
}
