//! Replay protection store
//!
//! Keyed expiry set tracking used `(addr, nonce)` pairs. The store is a
//! capability: the bundled in-memory variant caps growth with LRU eviction,
//! while production deployments substitute a shared store behind the same
//! trait.

use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use thiserror::Error;
use tokio::sync::Mutex;

/// Default entry cap for the in-memory store.
pub const DEFAULT_REPLAY_CAPACITY: usize = 10_000;

/// The store could not answer. Verification fails closed on this.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("replay store unavailable: {0}")]
pub struct ReplayStoreError(pub String);

/// Keyed expiry set. Keys are opaque `"<addr>:<nonce>"` strings; the store
/// never inspects them.
#[async_trait]
pub trait ReplayStore: Send + Sync {
    /// Returns true iff the key is currently present and unexpired.
    async fn check(&self, key: &str, ttl_seconds: i64) -> Result<bool, ReplayStoreError>;

    /// Inserts the key with expiry `now + ttl_seconds`.
    async fn store(&self, key: &str, ttl_seconds: i64) -> Result<(), ReplayStoreError>;

    /// Compare-and-insert: returns true if the key was already present,
    /// otherwise inserts it and returns false.
    ///
    /// The default delegates to `check` + `store` and is NOT atomic;
    /// implementations with native compare-and-insert (a single in-process
    /// lock, Redis `SET NX PX`, …) must override so that two concurrent
    /// verifications of the same key cannot both pass.
    async fn check_and_store(&self, key: &str, ttl_seconds: i64) -> Result<bool, ReplayStoreError> {
        if self.check(key, ttl_seconds).await? {
            return Ok(true);
        }
        self.store(key, ttl_seconds).await?;
        Ok(false)
    }
}

/// Bounded in-memory store: LRU-capped map of key → expiry.
///
/// Expired entries count as absent on read and are swept opportunistically,
/// either when the cache reaches capacity or from the background task.
pub struct InMemoryReplayStore {
    entries: Mutex<LruCache<String, DateTime<Utc>>>,
}

impl InMemoryReplayStore {
    /// Creates a store holding at most `capacity` entries. A zero capacity
    /// is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Creates a store with the default 10,000-entry cap.
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_REPLAY_CAPACITY)
    }

    /// Removes every expired entry.
    pub async fn sweep_expired(&self) {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        sweep(&mut entries, Utc::now());
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed = removed, "swept expired replay entries");
        }
    }

    /// Spawns a background task that sweeps expired entries once a minute.
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_sweeper(store: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                store.sweep_expired().await;
            }
        })
    }

    /// Current number of entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// True when the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl ReplayStore for InMemoryReplayStore {
    async fn check(&self, key: &str, _ttl_seconds: i64) -> Result<bool, ReplayStoreError> {
        let mut entries = self.entries.lock().await;
        Ok(live(&mut entries, key, Utc::now()))
    }

    async fn store(&self, key: &str, ttl_seconds: i64) -> Result<(), ReplayStoreError> {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;
        // Prefer dropping dead entries over evicting live ones.
        if entries.len() == entries.cap().get() {
            sweep(&mut entries, now);
        }
        entries.put(key.to_string(), now + Duration::seconds(ttl_seconds));
        Ok(())
    }

    async fn check_and_store(&self, key: &str, ttl_seconds: i64) -> Result<bool, ReplayStoreError> {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;
        if live(&mut entries, key, now) {
            return Ok(true);
        }
        if entries.len() == entries.cap().get() {
            sweep(&mut entries, now);
        }
        entries.put(key.to_string(), now + Duration::seconds(ttl_seconds));
        Ok(false)
    }
}

/// Returns whether `key` is present and unexpired, dropping it if expired.
fn live(entries: &mut LruCache<String, DateTime<Utc>>, key: &str, now: DateTime<Utc>) -> bool {
    match entries.peek(key) {
        Some(expires_at) if *expires_at > now => true,
        Some(_) => {
            entries.pop(key);
            false
        }
        None => false,
    }
}

/// Drops every entry whose expiry has passed.
fn sweep(entries: &mut LruCache<String, DateTime<Utc>>, now: DateTime<Utc>) {
    let expired: Vec<String> = entries
        .iter()
        .filter(|(_, expires_at)| **expires_at <= now)
        .map(|(key, _)| key.clone())
        .collect();
    for key in expired {
        entries.pop(&key);
    }
}
