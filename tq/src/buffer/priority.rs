//! Plain priority-ordered buffer

use std::collections::VecDeque;

use super::{Entry, TaskBuffer};

/// Buffer sorted by descending priority with FIFO tie-break
#[derive(Debug)]
pub struct PriorityBuffer<T, K = String> {
    entries: VecDeque<Entry<T, K>>,
}

impl<T, K> PriorityBuffer<T, K> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Priority of the entry that would be dequeued next
    pub fn peek_priority(&self) -> Option<i32> {
        self.entries.front().map(|e| e.priority)
    }

    /// Queued entries in dequeue order
    pub fn iter(&self) -> impl Iterator<Item = &Entry<T, K>> {
        self.entries.iter()
    }
}

impl<T, K> Default for PriorityBuffer<T, K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, K> TaskBuffer<T, K> for PriorityBuffer<T, K>
where
    T: Send + 'static,
    K: Send + 'static,
{
    fn enqueue(&mut self, item: T, priority: i32, id: Option<K>) {
        let entry = Entry::new(item, priority, id);

        // Most submissions arrive at the same or lower priority than the tail
        if self.entries.back().is_some_and(|last| last.priority >= priority) {
            self.entries.push_back(entry);
            return;
        }

        let index = self.entries.partition_point(|e| e.priority >= priority);
        self.entries.insert(index, entry);
    }

    fn dequeue_entry(&mut self) -> Option<Entry<T, K>> {
        self.entries.pop_front()
    }

    fn size(&self) -> usize {
        self.entries.len()
    }
}
