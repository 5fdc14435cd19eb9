//! Identity-tracking buffer decorator

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::marker::PhantomData;

use super::{Entry, IdentityIndex, PriorityBuffer, TaskBuffer};

/// Wraps an ordered buffer and records which ids are queued or already started
///
/// Processed ids are kept until the buffer is cleared, so a caller can skip
/// resubmitting work for an item whose earlier submission is still queued,
/// running, or finished.
#[derive(Debug)]
pub struct TrackedBuffer<T, K = String, B = PriorityBuffer<T, K>> {
    inner: B,
    pending: HashMap<K, usize>,
    processed: HashSet<K>,
    _item: PhantomData<fn() -> T>,
}

impl<T, K, B> TrackedBuffer<T, K, B>
where
    K: Eq + Hash,
    B: Default,
{
    pub fn new() -> Self {
        Self {
            inner: B::default(),
            pending: HashMap::new(),
            processed: HashSet::new(),
            _item: PhantomData,
        }
    }

    /// Number of distinct ids ever dequeued
    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    /// The wrapped ordering buffer
    pub fn inner(&self) -> &B {
        &self.inner
    }
}

impl<T, K, B> Default for TrackedBuffer<T, K, B>
where
    K: Eq + Hash,
    B: Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, K, B> TaskBuffer<T, K> for TrackedBuffer<T, K, B>
where
    T: Send + 'static,
    K: Eq + Hash + Clone + Send + 'static,
    B: TaskBuffer<T, K>,
{
    fn enqueue(&mut self, item: T, priority: i32, id: Option<K>) {
        if let Some(id) = &id {
            *self.pending.entry(id.clone()).or_insert(0) += 1;
        }
        self.inner.enqueue(item, priority, id);
    }

    fn dequeue_entry(&mut self) -> Option<Entry<T, K>> {
        let entry = self.inner.dequeue_entry()?;

        if let Some(id) = &entry.id {
            if let Some(count) = self.pending.get_mut(id) {
                *count -= 1;
                if *count == 0 {
                    self.pending.remove(id);
                }
            }
            self.processed.insert(id.clone());
        }

        Some(entry)
    }

    fn size(&self) -> usize {
        self.inner.size()
    }
}

impl<T, K, B> IdentityIndex<K> for TrackedBuffer<T, K, B>
where
    K: Eq + Hash,
{
    fn is_pending(&self, id: &K) -> bool {
        self.pending.contains_key(id)
    }

    fn is_processed(&self, id: &K) -> bool {
        self.processed.contains(id)
    }
}
