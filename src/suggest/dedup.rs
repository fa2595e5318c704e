use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Time-windowed set of suggestion content hashes. A hash inserted here
/// suppresses re-emission of the same suggestion until its TTL elapses.
/// Expiry is lazy: expired entries are purged on lookup and insert.
#[derive(Debug)]
pub struct DedupStore {
    entries: HashMap<String, Instant>,
    ttl: Duration,
}

impl DedupStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn insert(&mut self, hash: String) {
        self.purge();
        self.entries.insert(hash, Instant::now() + self.ttl);
    }

    pub fn contains(&mut self, hash: &str) -> bool {
        self.purge();
        self.entries.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge(&mut self) {
        let now = Instant::now();
        self.entries.retain(|_, deadline| *deadline > now);
    }
}
