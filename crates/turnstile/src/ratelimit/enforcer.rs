//! Sliding-window enforcement.
//!
//! One store transaction per request, no retries. A failed or timed-out
//! transaction always resolves to [`Decision::FailOpen`].

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::config::LimiterConfig;
use super::error::StoreError;
use super::key::{ClientIdentity, ClientKey};

/// Outcome of a completed window transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    /// Configured quota.
    pub limit: u32,
    /// Requests in the window, including the one being evaluated.
    pub count: u64,
    /// `max(0, limit - count)`.
    pub remaining: u64,
    /// Unix second at which the current window ends.
    pub reset_at: i64,
    /// Seconds from the decision until `reset_at`.
    pub retry_after: u64,
}

impl RateLimitStatus {
    fn new(limit: u32, count: u64, now: i64, reset_at: i64) -> Self {
        Self {
            limit,
            count,
            remaining: u64::from(limit).saturating_sub(count),
            reset_at,
            retry_after: u64::try_from(reset_at - now).unwrap_or(0),
        }
    }
}

/// Per-request decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Within quota.
    Allowed(RateLimitStatus),
    /// Over quota; the request must not reach downstream handlers.
    Rejected(RateLimitStatus),
    /// The store transaction failed; the request proceeds unlimited and
    /// without rate-limit headers.
    FailOpen,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }

    /// Status of the completed transaction, if there was one.
    pub fn status(&self) -> Option<&RateLimitStatus> {
        match self {
            Self::Allowed(status) | Self::Rejected(status) => Some(status),
            Self::FailOpen => None,
        }
    }
}

/// Decides per request whether a client is within its quota.
///
/// Stateless apart from the shared configuration; cheap to clone.
#[derive(Debug, Clone)]
pub struct WindowEnforcer {
    config: Arc<LimiterConfig>,
}

impl WindowEnforcer {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Enforce the limit using the current wall-clock second.
    pub async fn enforce(&self, identity: &ClientIdentity) -> Decision {
        self.enforce_at(identity, Utc::now().timestamp()).await
    }

    /// Enforce the limit as of `now` (unix seconds).
    pub async fn enforce_at(&self, identity: &ClientIdentity, now: i64) -> Decision {
        let key = ClientKey::derive(self.config.key_prefix(), identity);

        let count = match self.record(&key, now).await {
            Ok(count) => count,
            Err(e) => {
                // If the store fails, allow the request (fail open)
                warn!(key = %key, error = %e, "rate limit check failed, allowing request");
                return Decision::FailOpen;
            }
        };

        let limit = self.config.quota();
        let reset_at = now + self.config.window_secs();
        let status = RateLimitStatus::new(limit, count, now, reset_at);

        if count > u64::from(limit) {
            debug!(key = %key, count, limit, "rate limit exceeded");
            Decision::Rejected(status)
        } else {
            trace!(key = %key, count, limit, "rate limit check passed");
            Decision::Allowed(status)
        }
    }

    async fn record(&self, key: &ClientKey, now: i64) -> Result<u64, StoreError> {
        // Members must be unique so that hits within the same second are
        // all counted.
        let member = format!("{now}-{}", Uuid::new_v4());
        let timeout = self.config.store_timeout();
        let store = self.config.store();

        let hit = store.record_hit(key.as_str(), &member, now, self.config.window_secs());

        match tokio::time::timeout(timeout, hit).await {
            Ok(result) => result,
            Err(_) => {
                store.on_timeout();
                Err(StoreError::Timeout(timeout))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::ratelimit::store::{CountingStore, MemoryCountingStore};

    struct BrokenStore;

    #[async_trait]
    impl CountingStore for BrokenStore {
        async fn record_hit(
            &self,
            _key: &str,
            _member: &str,
            _now: i64,
            _window_secs: i64,
        ) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[derive(Default)]
    struct StalledStore {
        timeouts: AtomicUsize,
    }

    #[async_trait]
    impl CountingStore for StalledStore {
        async fn record_hit(
            &self,
            _key: &str,
            _member: &str,
            _now: i64,
            _window_secs: i64,
        ) -> Result<u64, StoreError> {
            std::future::pending().await
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }

        fn on_timeout(&self) {
            self.timeouts.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn enforcer(quota: u32) -> (WindowEnforcer, Arc<MemoryCountingStore>) {
        let store = Arc::new(MemoryCountingStore::new());
        let config =
            LimiterConfig::new(store.clone(), "rl:", quota, Duration::from_secs(60)).unwrap();
        (WindowEnforcer::new(config), store)
    }

    fn user(id: &str) -> ClientIdentity {
        ClientIdentity::User(id.to_string())
    }

    #[tokio::test]
    async fn test_quota_requests_allowed_with_decreasing_remaining() {
        let (enforcer, _) = enforcer(5);
        let start = 1_700_000_000;

        for (offset, expected) in [4, 3, 2, 1, 0].into_iter().enumerate() {
            let decision = enforcer.enforce_at(&user("42"), start + offset as i64 * 2).await;
            let Decision::Allowed(status) = decision else {
                panic!("request {} should be allowed: {decision:?}", offset + 1);
            };
            assert_eq!(status.remaining, expected);
            assert_eq!(status.limit, 5);
        }
    }

    #[tokio::test]
    async fn test_request_over_quota_rejected() {
        let (enforcer, _) = enforcer(5);
        let start = 1_700_000_000;
        for i in 0..5 {
            enforcer.enforce_at(&user("42"), start + i * 2).await;
        }

        let decision = enforcer.enforce_at(&user("42"), start + 11).await;
        let Decision::Rejected(status) = decision else {
            panic!("sixth request should be rejected: {decision:?}");
        };
        assert_eq!(status.count, 6);
        assert_eq!(status.remaining, 0);
        assert_eq!(status.reset_at, start + 11 + 60);
        assert_eq!(status.retry_after, 60);
        assert!(!decision.is_allowed());
    }

    #[tokio::test]
    async fn test_window_expiry_resets_count() {
        let (enforcer, _) = enforcer(5);
        let start = 1_700_000_000;
        for i in 0..6 {
            enforcer.enforce_at(&user("42"), start + i * 2).await;
        }

        let decision = enforcer.enforce_at(&user("42"), start + 75).await;
        let Decision::Allowed(status) = decision else {
            panic!("request after the window should be allowed: {decision:?}");
        };
        assert_eq!(status.count, 1);
        assert_eq!(status.remaining, 4);
    }

    #[tokio::test]
    async fn test_partial_window_eviction() {
        let (enforcer, _) = enforcer(5);
        let start = 1_700_000_000;
        for i in 0..6 {
            enforcer.enforce_at(&user("42"), start + i * 2).await;
        }

        // Second 65: the hits at seconds 0, 2 and 4 fall out of the window,
        // the ones at 6, 8 and 10 remain.
        let decision = enforcer.enforce_at(&user("42"), start + 65).await;
        assert_eq!(decision.status().unwrap().count, 4);
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn test_same_second_hits_all_count() {
        let (enforcer, _) = enforcer(3);
        let now = 1_700_000_000;
        for _ in 0..3 {
            assert!(enforcer.enforce_at(&user("7"), now).await.is_allowed());
        }
        assert!(matches!(
            enforcer.enforce_at(&user("7"), now).await,
            Decision::Rejected(_)
        ));
    }

    #[tokio::test]
    async fn test_clients_do_not_interfere() {
        let (enforcer, store) = enforcer(2);
        let now = 1_700_000_000;
        let address = ClientIdentity::Address("10.0.0.1".to_string());

        for _ in 0..3 {
            enforcer.enforce_at(&user("1"), now).await;
        }
        let other = enforcer.enforce_at(&user("2"), now).await;
        let anon = enforcer.enforce_at(&address, now).await;

        assert_eq!(other.status().unwrap().count, 1);
        assert_eq!(anon.status().unwrap().count, 1);
        assert_eq!(store.count("rl:user:1", now), 3);
        assert_eq!(store.count("rl:ip:10.0.0.1", now), 1);
    }

    #[tokio::test]
    async fn test_rejected_hits_still_count() {
        let (enforcer, store) = enforcer(1);
        let now = 1_700_000_000;
        for _ in 0..4 {
            enforcer.enforce_at(&user("1"), now).await;
        }
        assert_eq!(store.count("rl:user:1", now), 4);
    }

    #[tokio::test]
    async fn test_store_failure_fails_open() {
        let config =
            LimiterConfig::new(Arc::new(BrokenStore), "rl:", 1, Duration::from_secs(60)).unwrap();
        let enforcer = WindowEnforcer::new(config);

        for _ in 0..5 {
            let decision = enforcer.enforce(&user("1")).await;
            assert_eq!(decision, Decision::FailOpen);
            assert!(decision.is_allowed());
            assert!(decision.status().is_none());
        }
    }

    #[tokio::test]
    async fn test_store_timeout_fails_open() {
        let store = Arc::new(StalledStore::default());
        let config = LimiterConfig::new(store.clone(), "rl:", 1, Duration::from_secs(60))
            .unwrap()
            .with_store_timeout(Duration::from_millis(50));
        let enforcer = WindowEnforcer::new(config);

        assert_eq!(enforcer.enforce(&user("1")).await, Decision::FailOpen);
        assert_eq!(enforcer.enforce(&user("1")).await, Decision::FailOpen);
        assert_eq!(store.timeouts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_requests_admit_exactly_quota() {
        let (enforcer, _) = enforcer(10);
        let now = 1_700_000_000;

        let mut handles = Vec::new();
        for _ in 0..25 {
            let enforcer = enforcer.clone();
            handles.push(tokio::spawn(async move {
                enforcer.enforce_at(&user("busy"), now).await
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap().is_allowed() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 10);
    }

    #[test]
    fn test_retry_after_measured_from_decision() {
        let status = RateLimitStatus::new(5, 6, 1_011, 1_060);
        assert_eq!(status.retry_after, 49);
        assert_eq!(RateLimitStatus::new(5, 6, 2_000, 1_060).retry_after, 0);
    }

    #[tokio::test]
    async fn test_retry_after_matches_reset() {
        let (enforcer, _) = enforcer(1);
        let now = 1_700_000_000;
        enforcer.enforce_at(&user("9"), now).await;

        let decision = enforcer.enforce_at(&user("9"), now).await;
        let status = decision.status().unwrap();
        assert_eq!(status.reset_at - now, i64::try_from(status.retry_after).unwrap());
    }
}
