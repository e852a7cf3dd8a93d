//! WorkQueue: a locked deque shared by producers and a single consumer.
//!
//! End of stream is signalled in-band by a sentinel item that the consumer
//! recognizes with a predicate. The consumer swaps the whole deque out under
//! the lock and processes the batch after releasing it, so producers are only
//! ever blocked for the duration of a swap.
//!
//! Protocol (not checked at runtime):
//! - exactly one thread calls [`consume`] on a given queue;
//! - some producer eventually pushes a sentinel, or `consume` never returns.

use crate::synchronized::Synchronized;
use core::fmt;
use std::collections::VecDeque;
use std::thread;

pub struct WorkQueue<T> {
    queue: Synchronized<VecDeque<T>>,
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            queue: Synchronized::new(VecDeque::new()),
        }
    }

    pub fn push(&self, item: T) {
        self.queue.access().push_back(item);
    }

    /// Append all of `items` under a single lock acquisition. The iterator is
    /// drained before the lock is taken.
    pub fn push_batch<I>(&self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        let items: Vec<T> = items.into_iter().collect();
        if items.is_empty() {
            return;
        }
        self.queue.access().extend(items);
    }

    /// Swap the current contents for an empty deque and return them.
    pub fn take_all(&self) -> VecDeque<T> {
        std::mem::take(&mut *self.queue.access())
    }

    pub fn len(&self) -> usize {
        self.queue.access().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.access().is_empty()
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue").finish_non_exhaustive()
    }
}

/// Drain `queue` until an item satisfying `is_sentinel` arrives; return every
/// item seen before it, in the order observed.
///
/// Items queued after the sentinel in the same drained batch are dropped.
/// When a drain comes back empty the thread yields before trying again.
pub fn consume<T, P>(queue: &WorkQueue<T>, mut is_sentinel: P) -> Vec<T>
where
    P: FnMut(&T) -> bool,
{
    let mut got = Vec::new();
    loop {
        let batch = queue.take_all();
        if batch.is_empty() {
            thread::yield_now();
            continue;
        }
        for item in batch {
            if is_sentinel(&item) {
                log::trace!("sentinel reached after {} items", got.len());
                return got;
            }
            got.push(item);
        }
    }
}
