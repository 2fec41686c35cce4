use std::collections::{HashSet, VecDeque};

/// FIFO of package names still to sync, guarded by the set of every name
/// ever enqueued.
///
/// A name is enqueued at most once over the queue's lifetime, which is what
/// makes a job terminate on cyclic dependency graphs.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    pending: VecDeque<String>,
    seen: HashSet<String>,
}

impl WorkQueue {
    /// Queue seeded with `start`, which counts as seen.
    pub fn new(start: impl Into<String>) -> Self {
        let start = start.into();
        Self {
            pending: VecDeque::from([start.clone()]),
            seen: HashSet::from([start]),
        }
    }

    /// Enqueue `name` unless it was enqueued before. Returns whether it was
    /// added.
    pub fn add(&mut self, name: &str) -> bool {
        if name.is_empty() || self.seen.contains(name) {
            return false;
        }
        self.seen.insert(name.to_string());
        self.pending.push_back(name.to_string());
        true
    }

    pub fn pop(&mut self) -> Option<String> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of distinct names ever enqueued, including the start name.
    pub fn seen(&self) -> usize {
        self.seen.len()
    }
}
