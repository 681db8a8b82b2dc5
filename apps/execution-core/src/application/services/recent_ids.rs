//! Recent Identifier Window
//!
//! Fixed-capacity set of the most recently seen identifiers. Once full, the
//! oldest identifier is forgotten to make room for a new one, so memory stays
//! bounded however long the process runs.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

/// Identifiers remembered by default before the oldest are evicted.
pub const DEFAULT_ID_WINDOW: usize = 65_536;

/// Insertion-ordered set holding at most `capacity` identifiers.
#[derive(Debug, Clone)]
pub struct RecentIds<T> {
    members: HashSet<T>,
    order: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone + Eq + Hash> RecentIds<T> {
    /// Create an empty window. A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            members: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Remember `id`. Returns false if it is already in the window.
    pub fn insert(&mut self, id: T) -> bool {
        if self.members.contains(&id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        self.members.insert(id.clone());
        self.order.push_back(id);
        true
    }

    /// Returns true if `id` is in the window.
    #[must_use]
    pub fn contains(&self, id: &T) -> bool {
        self.members.contains(id)
    }

    /// Identifiers currently remembered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if nothing is remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl<T: Clone + Eq + Hash> Default for RecentIds<T> {
    fn default() -> Self {
        Self::new(DEFAULT_ID_WINDOW)
    }
}
