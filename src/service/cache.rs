/// In-memory TTL caches for scraped HTML and processed results
///
/// Both caches are process-lifetime only and are deliberately never backed
/// by durable storage: scraped page content and inference results must not
/// outlive the process (privacy/ephemerality property of the pipeline).
/// They are a latency optimization, not a correctness mechanism; a
/// multi-instance deployment gets best-effort, per-instance hit rates.
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};
use tracing::debug;

/// Generic key -> (value, inserted-at) map with lazy TTL expiry on read.
///
/// There is no eviction thread: expired entries are ignored when read and
/// overwritten on the next insert for the same key.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: HashMap<K, (V, Instant)>,
    ttl: Duration,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Look up a key, treating entries older than the TTL as absent
    pub fn get(&self, key: &K) -> Option<V> {
        match self.entries.get(key) {
            Some((value, inserted)) if inserted.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                debug!("Cache entry expired (ttl {:?})", self.ttl);
                None
            }
            None => None,
        }
    }

    /// Insert or overwrite an entry, stamping it with the current time
    pub fn insert(&mut self, key: K, value: V) {
        self.entries.insert(key, (value, Instant::now()));
    }

    /// Number of entries currently stored, expired or not
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry past its TTL; returns how many were removed
    pub fn purge_expired(&mut self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, (_, inserted)| inserted.elapsed() < ttl);
        before - self.entries.len()
    }
}
