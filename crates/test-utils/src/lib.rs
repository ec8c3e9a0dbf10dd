//! Turnstile test utilities.
//!
//! Helpers for integration testing: stores that simulate outages, state
//! builders over the in-process store, request builders, and assertion
//! utilities for rate limit headers.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use turnstile::AppState;
use turnstile::ratelimit::{
    AuthenticatedUser, CountingStore, LimiterConfig, MemoryCountingStore, StoreError,
};

/// Key prefix used by every helper in this crate.
pub const TEST_PREFIX: &str = "test:";

/// A store whose every transaction fails, counting the attempts.
#[derive(Debug, Default)]
pub struct FailingStore {
    attempts: AtomicUsize,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transactions attempted so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CountingStore for FailingStore {
    async fn record_hit(
        &self,
        _key: &str,
        _member: &str,
        _now: i64,
        _window_secs: i64,
    ) -> Result<u64, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("simulated outage".to_string()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("simulated outage".to_string()))
    }
}

/// A store that answers only after `delay`.
#[derive(Debug)]
pub struct SlowStore {
    inner: MemoryCountingStore,
    delay: Duration,
}

impl SlowStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryCountingStore::new(),
            delay,
        }
    }
}

#[async_trait]
impl CountingStore for SlowStore {
    async fn record_hit(
        &self,
        key: &str,
        member: &str,
        now: i64,
        window_secs: i64,
    ) -> Result<u64, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.record_hit(key, member, now, window_secs).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Build state over a fresh in-process store.
pub fn memory_state(quota: u32, window: Duration) -> (AppState, Arc<MemoryCountingStore>) {
    let store = Arc::new(MemoryCountingStore::new());
    let limiter = LimiterConfig::new(store.clone(), TEST_PREFIX, quota, window)
        .expect("valid limiter config");
    (AppState::from_parts(limiter, false, None), store)
}

/// Build state over any store.
pub fn state_with_store(store: Arc<dyn CountingStore>, quota: u32, window: Duration) -> AppState {
    let limiter =
        LimiterConfig::new(store, TEST_PREFIX, quota, window).expect("valid limiter config");
    AppState::from_parts(limiter, false, None)
}

/// A GET request arriving from `ip`.
pub fn request_from(path: &str, ip: &str) -> Request<Body> {
    let addr: SocketAddr = format!("{ip}:40000").parse().expect("valid socket address");
    let mut request = Request::get(path).body(Body::empty()).unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

/// A GET request from `ip` already attributed to `user_id`.
pub fn request_as_user(path: &str, ip: &str, user_id: &str) -> Request<Body> {
    let mut request = request_from(path, ip);
    request
        .extensions_mut()
        .insert(AuthenticatedUser(user_id.to_string()));
    request
}

/// Read a response body as JSON.
pub async fn response_json(response: axum::response::Response) -> serde_json::Value {
    use http_body_util::BodyExt;

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Assertion helpers for rate limit headers.
pub mod assert {
    use axum::http::HeaderMap;

    /// Parse a numeric header, if present.
    pub fn header_i64(headers: &HeaderMap, name: &str) -> Option<i64> {
        headers
            .get(name)
            .map(|v| v.to_str().unwrap().parse().unwrap())
    }

    /// Assert the three advisory headers carry the expected limit and remaining.
    pub fn rate_limit_headers(headers: &HeaderMap, limit: i64, remaining: i64) {
        assert_eq!(
            header_i64(headers, "x-ratelimit-limit"),
            Some(limit),
            "x-ratelimit-limit mismatch"
        );
        assert_eq!(
            header_i64(headers, "x-ratelimit-remaining"),
            Some(remaining),
            "x-ratelimit-remaining mismatch"
        );
        assert!(
            headers.contains_key("x-ratelimit-reset"),
            "missing x-ratelimit-reset"
        );
    }

    /// Assert no advisory header is present.
    pub fn no_rate_limit_headers(headers: &HeaderMap) {
        for name in [
            "x-ratelimit-limit",
            "x-ratelimit-remaining",
            "x-ratelimit-reset",
        ] {
            assert!(
                !headers.contains_key(name),
                "unexpected header {name}: {:?}",
                headers.get(name)
            );
        }
    }
}
