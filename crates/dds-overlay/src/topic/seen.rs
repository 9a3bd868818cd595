//! Bounded memory of publish event ids.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;
use uuid::Uuid;

/// FIFO cache of event ids already delivered.
///
/// Brokers re-distribute what they receive, so the same event can come back
/// over a cycle of brokers; the cache makes each event land once.
#[derive(Debug)]
pub struct SeenEventCache {
    inner: Mutex<SeenInner>,
    max_size: usize,
}

#[derive(Debug, Default)]
struct SeenInner {
    ids: HashSet<Uuid>,
    insertion_order: VecDeque<Uuid>,
}

impl SeenEventCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(SeenInner::default()),
            max_size: max_size.max(1),
        }
    }

    pub fn has_seen(&self, id: &Uuid) -> bool {
        self.inner.lock().ids.contains(id)
    }

    /// Record `id`. Returns `false` if it was already there.
    ///
    /// At capacity the oldest id is forgotten first.
    pub fn mark_seen(&self, id: Uuid) -> bool {
        let mut inner = self.inner.lock();
        if inner.ids.contains(&id) {
            return false;
        }
        if inner.ids.len() >= self.max_size {
            if let Some(oldest) = inner.insertion_order.pop_front() {
                inner.ids.remove(&oldest);
            }
        }
        inner.ids.insert(id);
        inner.insertion_order.push_back(id);
        true
    }

    pub fn len(&self) -> usize {
        self.inner.lock().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
