// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Event Deduplication
//!
//! Time-bounded membership test for event identifiers. Redelivered messages
//! carrying an `event_id` seen within the TTL window are acknowledged without
//! running their handler again. The cache is per process: suppression is best
//! effort per instance, not cluster wide.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::time::Instant;
use tracing::debug;

/// Reference TTL for dedup entries.
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(60 * 60);

const MIN_EVICTION_PERIOD: Duration = Duration::from_millis(10);

/// In-memory map of event id to first-seen instant.
#[derive(Debug)]
pub struct DedupCache {
    entries: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
}

impl DedupCache {
    /// Creates a cache without background eviction. Expired entries are still
    /// treated as absent; call [`DedupCache::evict_expired`] to reclaim them.
    pub fn new(ttl: Duration) -> DedupCache {
        DedupCache {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Creates a shared cache and spawns its eviction task, which runs every
    /// `ttl / 2` and stops once the last `Arc` is dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(ttl: Duration) -> Arc<DedupCache> {
        let cache = Arc::new(DedupCache::new(ttl));
        let weak = Arc::downgrade(&cache);
        let period = (ttl / 2).max(MIN_EVICTION_PERIOD);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(cache) => {
                        let evicted = cache.evict_expired();
                        if evicted > 0 {
                            debug!(evicted = evicted, "dedup entries evicted");
                        }
                    }
                    None => break,
                }
            }
        });

        cache
    }

    /// Returns true if `event_id` was already seen within the TTL window.
    ///
    /// Otherwise records it as seen now and returns false. An empty id can't be
    /// deduplicated and is never a duplicate.
    pub fn is_duplicate(&self, event_id: &str) -> bool {
        if event_id.is_empty() {
            return false;
        }

        let now = Instant::now();
        let mut entries = self.lock();

        if let Some(seen) = entries.get(event_id) {
            if now.duration_since(*seen) < self.ttl {
                return true;
            }
        }

        entries.insert(event_id.to_owned(), now);
        false
    }

    /// Drops the entry for `event_id` so the next delivery is processed again.
    pub fn forget(&self, event_id: &str) {
        if event_id.is_empty() {
            return;
        }
        self.lock().remove(event_id);
    }

    /// Removes every entry older than the TTL and returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, seen| now.duration_since(*seen) < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        DedupCache::new(DEFAULT_DEDUP_TTL)
    }
}
