//! In-process counting store.
//!
//! Same window semantics as the Redis store, but only correct for a single
//! service instance. Used for local development and tests.

use async_trait::async_trait;
use dashmap::DashMap;

use super::CountingStore;
use crate::ratelimit::error::StoreError;

/// Entry set for one client key.
#[derive(Debug, Default)]
struct WindowSet {
    /// `(score, member)` pairs.
    entries: Vec<(i64, String)>,
    /// Unix second at which the whole set expires.
    expires_at: i64,
}

impl WindowSet {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// Counting store held in a sharded concurrent map.
///
/// The shard write lock is held for the whole of `record_hit`, which makes
/// the transaction atomic per key.
#[derive(Debug, Default)]
pub struct MemoryCountingStore {
    sets: DashMap<String, WindowSet>,
}

impl MemoryCountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every set whose expiry has passed. Returns how many were removed.
    pub fn purge_expired(&self, now: i64) -> usize {
        let before = self.sets.len();
        self.sets.retain(|_, set| !set.is_expired(now));
        before.saturating_sub(self.sets.len())
    }

    /// Number of live entries stored under `key`.
    pub fn count(&self, key: &str, now: i64) -> usize {
        self.sets
            .get(key)
            .filter(|set| !set.is_expired(now))
            .map_or(0, |set| set.entries.len())
    }

    /// Number of keys currently held, expired or not.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

#[async_trait]
impl CountingStore for MemoryCountingStore {
    async fn record_hit(
        &self,
        key: &str,
        member: &str,
        now: i64,
        window_secs: i64,
    ) -> Result<u64, StoreError> {
        let window_start = now - window_secs;

        let mut set = self.sets.entry(key.to_string()).or_default();
        if set.is_expired(now) {
            set.entries.clear();
        }

        set.entries
            .retain(|(score, existing)| *score > window_start && existing != member);
        set.entries.push((now, member.to_string()));
        set.expires_at = now + window_secs;

        Ok(set.entries.len() as u64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
