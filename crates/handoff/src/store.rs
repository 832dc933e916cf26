use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::codec::DEFAULT_MAX_ENTRY_BYTES;
use crate::error::StoreError;

/// Size- and time-bounded key/value cache holding result chunks.
///
/// Implementations must never return part of a value: a read yields the whole
/// entry or nothing.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
}

struct Entry {
    value: String,
    expires_at: Instant,
    seq: u64,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process [`ResultStore`] with a per-entry size cap and lazy expiry.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Entry>>,
    next_seq: Arc<AtomicU64>,
    max_entries: usize,
    max_entry_bytes: usize,
}

impl MemoryStore {
    pub fn new(max_entries: usize, max_entry_bytes: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            next_seq: Arc::new(AtomicU64::new(0)),
            max_entries,
            max_entry_bytes,
        }
    }

    /// Drop an entry regardless of its TTL.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> StoreStats {
        let now = Instant::now();
        let expired = self
            .entries
            .iter()
            .filter(|r| r.value().is_expired(now))
            .count();
        StoreStats {
            entries: self.entries.len(),
            expired_pending: expired,
            max_entries: self.max_entries,
            max_entry_bytes: self.max_entry_bytes,
        }
    }

    fn make_room(&self) {
        if self.entries.len() < self.max_entries {
            return;
        }
        let purged = self.purge_expired();
        if self.entries.len() < self.max_entries {
            tracing::debug!(purged, "Purged expired cache entries");
            return;
        }

        // Still full: clear the 25% closest to expiry, oldest writes first
        let mut by_age: Vec<_> = self
            .entries
            .iter()
            .map(|r| (r.value().expires_at, r.value().seq, r.key().clone()))
            .collect();
        by_age.sort_unstable_by_key(|(expires_at, seq, _)| (*expires_at, *seq));
        by_age.truncate((self.max_entries / 4).max(1));
        let to_remove: Vec<_> = by_age.into_iter().map(|(_, _, key)| key).collect();
        for key in &to_remove {
            self.entries.remove(key);
        }
        tracing::warn!(evicted = to_remove.len(), "Cache full, evicted live entries");
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(10_000, DEFAULT_MAX_ENTRY_BYTES)
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        if value.len() > self.max_entry_bytes {
            return Err(StoreError::ValueTooLarge {
                key: key.to_string(),
                size: value.len(),
                limit: self.max_entry_bytes,
            });
        }
        if !self.entries.contains_key(key) {
            self.make_room();
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
                seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        // Removal happens after the read guard is released.
        let live = match self.entries.get(key) {
            None => return Ok(None),
            Some(entry) if entry.is_expired(now) => None,
            Some(entry) => Some(entry.value.clone()),
        };
        if live.is_none() {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        Ok(live)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub entries: usize,
    pub expired_pending: usize,
    pub max_entries: usize,
    pub max_entry_bytes: usize,
}
