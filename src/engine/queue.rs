//! Pending-narration queue ordered by ascending priority.
//!
//! Ties keep insertion order. Each insert lands after every entry of equal
//! or more urgent priority, so stability holds by construction rather than
//! by whichever sort routine happens to be used.

use std::collections::VecDeque;

use crate::model::{EventKind, NormalizedEvent};

#[derive(Debug, Default)]
pub struct NarrationQueue {
    items: VecDeque<NormalizedEvent>,
}

impl NarrationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert behind all entries with priority <= the new event's.
    pub fn insert(&mut self, event: NormalizedEvent) {
        let at = self.items.partition_point(|e| e.priority <= event.priority);
        self.items.insert(at, event);
    }

    /// Put an event ahead of everything, regardless of priority.
    pub fn push_front(&mut self, event: NormalizedEvent) {
        self.items.push_front(event);
    }

    /// Take the most urgent event.
    pub fn pop(&mut self) -> Option<NormalizedEvent> {
        self.items.pop_front()
    }

    /// Remove every queued event of `kind`, returning their ids in queue order.
    pub fn remove_kind(&mut self, kind: EventKind) -> Vec<String> {
        let mut removed = Vec::new();
        self.items.retain(|e| {
            if e.kind == kind {
                removed.push(e.id.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Ids in play order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|e| e.id.as_str())
    }
}
