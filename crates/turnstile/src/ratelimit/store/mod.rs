//! Counting store abstraction.
//!
//! The store is the single source of truth shared by every service
//! instance. It keeps one ordered set per client key, scored by the unix
//! second at which each request occurred.

mod memory;
mod redis_store;

use async_trait::async_trait;

use super::error::StoreError;

pub use memory::MemoryCountingStore;
pub use redis_store::RedisCountingStore;

/// A store able to run the sliding-window transaction atomically.
///
/// Implementations must apply the whole of [`record_hit`](Self::record_hit)
/// as one indivisible unit with respect to other calls on the same key.
#[async_trait]
pub trait CountingStore: Send + Sync {
    /// Record one occurrence and return the number of occurrences in the window.
    ///
    /// In order, and atomically for `key`:
    /// 1. remove every entry scored in `[0, now - window_secs]`,
    /// 2. insert `member` scored at `now`,
    /// 3. read the cardinality of the set (including the new entry),
    /// 4. set the key to expire after `window_secs`.
    ///
    /// `window_secs` is always positive and bounded by
    /// [`MAX_WINDOW`](crate::ratelimit::MAX_WINDOW).
    async fn record_hit(
        &self,
        key: &str,
        member: &str,
        now: i64,
        window_secs: i64,
    ) -> Result<u64, StoreError>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Called when a caller gave up waiting on this store.
    ///
    /// The abandoned future is dropped mid-flight, so any cleanup its error
    /// path would have done must happen here.
    fn on_timeout(&self) {}
}
