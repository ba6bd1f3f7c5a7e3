//! Least-loaded connector pool.
//!
//! # Responsibilities
//! - Keep connectors ordered by pending request count (binary min-heap)
//! - Track each connector's heap position so a specific connector can be
//!   pulled out in O(log n) when its completion arrives
//!
//! # Invariants
//! - `entries[i].pending <= entries[2i+1].pending` and `<= entries[2i+2].pending`
//! - `positions[entries[i].connector.id()] == i` for every `i`
//!
//! Ties between equally loaded connectors are broken by array order.

use std::collections::HashMap;
use std::sync::Arc;

use crate::load_balancer::connector::{Connector, ConnectorId};

/// A connector together with its in-flight request count.
#[derive(Debug)]
pub struct Entry<S> {
    pub connector: Arc<Connector<S>>,
    pub pending: usize,
}

impl<S> Entry<S> {
    pub fn new(connector: Arc<Connector<S>>) -> Self {
        Self {
            connector,
            pending: 0,
        }
    }

    fn id(&self) -> ConnectorId {
        self.connector.id()
    }
}

/// Point-in-time load of one pooled connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorLoad {
    pub id: ConnectorId,
    pub target: String,
    pub pending: usize,
}

/// Array-backed min-heap of connectors keyed by pending count.
#[derive(Debug)]
pub struct Pool<S> {
    entries: Vec<Entry<S>>,
    positions: HashMap<ConnectorId, usize>,
}

impl<S> Default for Pool<S> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            positions: HashMap::new(),
        }
    }
}

impl<S> Pool<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert an idle connector.
    ///
    /// Returns `false` if the connector is already pooled.
    pub fn push(&mut self, connector: Arc<Connector<S>>) -> bool {
        self.push_entry(Entry::new(connector))
    }

    /// Insert an entry keeping its pending count.
    pub fn push_entry(&mut self, entry: Entry<S>) -> bool {
        if self.positions.contains_key(&entry.id()) {
            return false;
        }
        let index = self.entries.len();
        self.positions.insert(entry.id(), index);
        self.entries.push(entry);
        self.sift_up(index);
        true
    }

    /// The least-loaded entry, if any.
    pub fn peek(&self) -> Option<&Entry<S>> {
        self.entries.first()
    }

    /// Remove and return the least-loaded entry.
    pub fn pop_min(&mut self) -> Option<Entry<S>> {
        self.remove_at(0)
    }

    /// Remove the entry at heap position `index`.
    pub fn remove_at(&mut self, index: usize) -> Option<Entry<S>> {
        if index >= self.entries.len() {
            return None;
        }
        let last = self.entries.len() - 1;
        self.swap(index, last);
        let entry = self.entries.pop()?;
        self.positions.remove(&entry.id());

        if index < self.entries.len() && !self.sift_down(index) {
            self.sift_up(index);
        }
        Some(entry)
    }

    /// Current heap position of the connector with `id`.
    pub fn position_of(&self, id: ConnectorId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// Find a pooled connector by target address.
    pub fn position_of_target(&self, target: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.connector.target() == target)
    }

    pub fn snapshot(&self) -> Vec<ConnectorLoad> {
        self.entries
            .iter()
            .map(|e| ConnectorLoad {
                id: e.id(),
                target: e.connector.target().to_string(),
                pending: e.pending,
            })
            .collect()
    }

    pub fn total_pending(&self) -> usize {
        self.entries.iter().map(|e| e.pending).sum()
    }

    /// Drain the pool, returning every connector.
    pub fn into_connectors(self) -> Vec<Arc<Connector<S>>> {
        self.entries.into_iter().map(|e| e.connector).collect()
    }

    fn swap(&mut self, i: usize, j: usize) {
        if i == j {
            return;
        }
        self.entries.swap(i, j);
        let id_i = self.entries[i].id();
        let id_j = self.entries[j].id();
        self.positions.insert(id_i, i);
        self.positions.insert(id_j, j);
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.entries[index].pending >= self.entries[parent].pending {
                break;
            }
            self.swap(index, parent);
            index = parent;
        }
    }

    /// Returns true if the element moved.
    fn sift_down(&mut self, start: usize) -> bool {
        let len = self.entries.len();
        let mut index = start;
        loop {
            let left = 2 * index + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let mut smallest = left;
            if right < len && self.entries[right].pending < self.entries[left].pending {
                smallest = right;
            }
            if self.entries[index].pending <= self.entries[smallest].pending {
                break;
            }
            self.swap(index, smallest);
            index = smallest;
        }
        index > start
    }

    /// Check both heap invariants.
    pub fn is_consistent(&self) -> bool {
        if self.positions.len() != self.entries.len() {
            return false;
        }
        self.entries.iter().enumerate().all(|(i, entry)| {
            let indexed = self.positions.get(&entry.id()) == Some(&i);
            let ordered = [2 * i + 1, 2 * i + 2]
                .iter()
                .filter_map(|&c| self.entries.get(c))
                .all(|child| entry.pending <= child.pending);
            indexed && ordered
        })
    }
}
