//! In-memory implementation of `CacheStore`.
//!
//! Entries live in a `HashMap` behind `Arc<Mutex<_>>`, so clones share one
//! store: tests hand a clone to the checkpoint manager and inspect the other.
//! Expiry uses `tokio::time::Instant`, which lets paused-clock tests advance
//! past a TTL. Expired entries are purged lazily on access.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use meridian_contracts::error::{MeridianError, MeridianResult};
use meridian_core::traits::CacheStore;

struct Entry {
    value: String,
    /// `None` = no expiry (ttl 0).
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |t| now < t)
    }
}

fn deadline(ttl_secs: u64) -> Option<Instant> {
    (ttl_secs > 0).then(|| Instant::now() + Duration::from_secs(ttl_secs))
}

/// Match `key` against a pattern where `*` matches any run of characters.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }
    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if !key.starts_with(first) || key.len() < first.len() + last.len() || !key.ends_with(last) {
        return false;
    }
    let mut rest = &key[first.len()..key.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    true
}

#[derive(Clone, Default)]
pub struct InMemoryCacheStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live entry count.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .map(|m| m.values().filter(|e| e.live(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining TTL of a live key; `None` when absent or without expiry.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let map = self.lock().ok()?;
        let entry = map.get(key).filter(|e| e.live(now))?;
        entry.expires_at.map(|t| t - now)
    }

    fn lock(&self) -> MeridianResult<MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries.lock().map_err(|e| MeridianError::Cache {
            reason: format!("cache lock poisoned: {e}"),
        })
    }

    fn live_entry<'m>(map: &'m mut HashMap<String, Entry>, key: &str) -> Option<&'m mut Entry> {
        let now = Instant::now();
        if map.get(key).is_some_and(|e| !e.live(now)) {
            map.remove(key);
            debug!(key, "cache entry expired");
        }
        map.get_mut(key)
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> MeridianResult<Option<String>> {
        let mut map = self.lock()?;
        Ok(Self::live_entry(&mut map, key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> MeridianResult<()> {
        let mut map = self.lock()?;
        map.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: deadline(ttl_secs),
            },
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> MeridianResult<bool> {
        let mut map = self.lock()?;
        Ok(Self::live_entry(&mut map, key).is_some())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> MeridianResult<bool> {
        let mut map = self.lock()?;
        match Self::live_entry(&mut map, key) {
            Some(entry) => {
                entry.expires_at = deadline(ttl_secs);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn del(&self, key: &str) -> MeridianResult<bool> {
        let mut map = self.lock()?;
        Ok(map.remove(key).is_some())
    }

    async fn keys(&self, pattern: &str) -> MeridianResult<Vec<String>> {
        let now = Instant::now();
        let mut map = self.lock()?;
        map.retain(|_, e| e.live(now));
        let mut keys: Vec<String> = map
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}
