//! Cache stores backing memoized methods.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use plexus_core::Value;
use tokio::time::Instant;

/// Key/value storage with per-entry expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the value under `key` if present and not expired.
    async fn get(&self, key: &str) -> Option<Value>;

    /// Stores `value` under `key` for `ttl`. A zero `ttl` stores nothing.
    async fn set(&self, key: &str, value: Value, ttl: Duration);

    /// Removes `key`, returning whether an entry existed.
    async fn remove(&self, key: &str) -> bool;

    /// Number of entries currently held (expired entries may be counted
    /// until they are next read).
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone)]
struct StoredValue {
    value: Value,
    expires_at: Instant,
}

/// In-memory store backed by a bounded `quick_cache` cache.
pub struct MemoryStore {
    entries: quick_cache::sync::Cache<String, StoredValue>,
    capacity: usize,
}

impl MemoryStore {
    /// Creates a store holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: quick_cache::sync::Cache::new(capacity),
            capacity,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Option<Value> {
        let stored = self.entries.get(key)?;
        if stored.expires_at <= Instant::now() {
            self.entries.remove(key);
            return None;
        }
        Some(stored.value)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("capacity", &self.capacity)
            .field("entries", &self.entries.len())
            .finish()
    }
}
