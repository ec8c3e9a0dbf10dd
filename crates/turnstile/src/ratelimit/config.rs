//! Limiter configuration.

use std::sync::Arc;
use std::time::Duration;

use super::error::LimiterError;
use super::store::CountingStore;

/// Default bound on a single store transaction.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(250);

/// Longest accepted window (one year).
pub const MAX_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Immutable limiter settings, built once at startup and shared by every
/// request handler.
#[derive(Clone)]
pub struct LimiterConfig {
    store: Arc<dyn CountingStore>,
    key_prefix: String,
    quota: u32,
    window: Duration,
    window_secs: i64,
    store_timeout: Duration,
}

impl LimiterConfig {
    /// Create a limiter configuration.
    ///
    /// The window is evaluated in whole seconds, so anything shorter than
    /// one second is rejected along with a zero quota. Windows longer than
    /// [`MAX_WINDOW`] are rejected too.
    pub fn new(
        store: Arc<dyn CountingStore>,
        key_prefix: impl Into<String>,
        quota: u32,
        window: Duration,
    ) -> Result<Self, LimiterError> {
        if quota == 0 {
            return Err(LimiterError::ZeroQuota);
        }
        if window.as_secs() == 0 {
            return Err(LimiterError::WindowTooShort(window));
        }
        let window_secs = i64::try_from(window.as_secs())
            .ok()
            .filter(|_| window <= MAX_WINDOW)
            .ok_or(LimiterError::WindowTooLong {
                window,
                max: MAX_WINDOW,
            })?;

        Ok(Self {
            store,
            key_prefix: key_prefix.into(),
            quota,
            window,
            window_secs,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        })
    }

    /// Override the store transaction timeout.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn CountingStore> {
        &self.store
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Requests allowed per window.
    pub fn quota(&self) -> u32 {
        self.quota
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Window length in whole seconds.
    pub fn window_secs(&self) -> i64 {
        self.window_secs
    }

    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }
}

impl std::fmt::Debug for LimiterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimiterConfig")
            .field("key_prefix", &self.key_prefix)
            .field("quota", &self.quota)
            .field("window", &self.window)
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ratelimit::store::MemoryCountingStore;

    fn store() -> Arc<dyn CountingStore> {
        Arc::new(MemoryCountingStore::new())
    }

    #[test]
    fn test_new_keeps_values() {
        let config = LimiterConfig::new(store(), "rl:", 5, Duration::from_secs(60)).unwrap();
        assert_eq!(config.key_prefix(), "rl:");
        assert_eq!(config.quota(), 5);
        assert_eq!(config.window_secs(), 60);
        assert_eq!(config.store_timeout(), DEFAULT_STORE_TIMEOUT);
    }

    #[test]
    fn test_rejects_zero_quota() {
        let err = LimiterConfig::new(store(), "rl:", 0, Duration::from_secs(60)).unwrap_err();
        assert_eq!(err, LimiterError::ZeroQuota);
    }

    #[test]
    fn test_rejects_sub_second_window() {
        let window = Duration::from_millis(900);
        let err = LimiterConfig::new(store(), "rl:", 5, window).unwrap_err();
        assert_eq!(err, LimiterError::WindowTooShort(window));
    }

    #[test]
    fn test_rejects_window_beyond_cap() {
        let err = LimiterConfig::new(store(), "rl:", 5, Duration::from_secs(u64::MAX)).unwrap_err();
        assert!(matches!(err, LimiterError::WindowTooLong { .. }));

        let just_over = MAX_WINDOW + Duration::from_secs(1);
        let err = LimiterConfig::new(store(), "rl:", 5, just_over).unwrap_err();
        assert_eq!(
            err,
            LimiterError::WindowTooLong {
                window: just_over,
                max: MAX_WINDOW,
            }
        );
    }

    #[test]
    fn test_accepts_window_at_cap() {
        let config = LimiterConfig::new(store(), "rl:", 5, MAX_WINDOW).unwrap();
        assert_eq!(config.window_secs(), 365 * 24 * 60 * 60);
    }

    #[test]
    fn test_fractional_window_truncates() {
        let config = LimiterConfig::new(store(), "", 1, Duration::from_millis(1500)).unwrap();
        assert_eq!(config.window_secs(), 1);
    }

    #[test]
    fn test_with_store_timeout() {
        let config = LimiterConfig::new(store(), "", 1, Duration::from_secs(1))
            .unwrap()
            .with_store_timeout(Duration::from_secs(2));
        assert_eq!(config.store_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_debug_omits_store() {
        let config = LimiterConfig::new(store(), "rl:", 5, Duration::from_secs(60)).unwrap();
        let debug = format!("{config:?}");
        assert!(debug.contains("quota: 5"));
        assert!(!debug.contains("MemoryCountingStore"));
    }
}
