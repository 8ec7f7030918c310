//! Bounded window of event ids already admitted or narrated.
//!
//! Duplicate delivery from the change feed happens within seconds, so ids
//! only need to be remembered for a short window. Entries expire after
//! `retention` and the window never holds more than `capacity` ids.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct SeenIds {
    retention: Duration,
    capacity: usize,
    order: VecDeque<(String, Instant)>,
    index: HashSet<String>,
}

impl SeenIds {
    pub fn new(retention: Duration, capacity: usize) -> Self {
        Self {
            retention,
            capacity: capacity.max(1),
            order: VecDeque::new(),
            index: HashSet::new(),
        }
    }

    /// Whether `id` is still inside the window at `now`.
    pub fn contains(&mut self, id: &str, now: Instant) -> bool {
        self.evict(now);
        self.index.contains(id)
    }

    /// Remember `id`. Re-inserting a known id keeps its original slot.
    pub fn insert(&mut self, id: &str, now: Instant) {
        self.evict(now);
        if self.index.contains(id) {
            return;
        }
        self.index.insert(id.to_string());
        self.order.push_back((id.to_string(), now));
        while self.order.len() > self.capacity {
            self.pop_oldest();
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn evict(&mut self, now: Instant) {
        while let Some((_, at)) = self.order.front() {
            if now.saturating_duration_since(*at) < self.retention {
                break;
            }
            self.pop_oldest();
        }
    }

    fn pop_oldest(&mut self) {
        if let Some((id, _)) = self.order.pop_front() {
            self.index.remove(&id);
        }
    }
}
