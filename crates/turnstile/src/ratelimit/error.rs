//! Error types for the rate limiting core.

use std::time::Duration;

use thiserror::Error;

/// Failure of a counting-store transaction.
///
/// Every variant is handled by the enforcer's fail-open branch; none of
/// them ever reaches an HTTP client.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store transaction timed out after {0:?}")]
    Timeout(Duration),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Rejected limiter configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LimiterError {
    #[error("rate limit quota must be greater than zero")]
    ZeroQuota,

    #[error("rate limit window must be at least one second, got {0:?}")]
    WindowTooShort(Duration),

    #[error("rate limit window must not exceed {max:?}, got {window:?}")]
    WindowTooLong { window: Duration, max: Duration },
}
