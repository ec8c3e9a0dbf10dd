//! Application state shared across all handlers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::HeaderName;
use tracing::info;

use crate::config::{Config, StoreBackend};
use crate::metrics::Metrics;
use crate::ratelimit::{
    CountingStore, LimiterConfig, MemoryCountingStore, RedisCountingStore, WindowEnforcer,
};

/// Bound on the health check ping.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(1);

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Window enforcer over the shared counting store.
    enforcer: WindowEnforcer,

    /// Set when the in-process store is in use, so the binary can purge it.
    memory_store: Option<Arc<MemoryCountingStore>>,

    /// Prometheus metrics.
    metrics: Arc<Metrics>,

    /// Honour forwarded-for headers when resolving client addresses.
    trust_forwarded: bool,

    /// Header carrying an upstream-resolved user id.
    user_header: Option<HeaderName>,
}

impl AppState {
    /// Build application state from process configuration.
    ///
    /// No connection to the counting store is made here; a store that is
    /// down at startup only degrades rate limiting.
    pub fn new(config: &Config) -> Result<Self> {
        let mut memory_store = None;
        let store: Arc<dyn CountingStore> = match config.backend {
            StoreBackend::Redis => Arc::new(
                RedisCountingStore::open(&config.redis_url).context("invalid REDIS_URL")?,
            ),
            StoreBackend::Memory => {
                let store = Arc::new(MemoryCountingStore::new());
                memory_store = Some(store.clone());
                store
            }
        };
        info!(backend = ?config.backend, "Counting store configured");

        let limiter = LimiterConfig::new(store, &config.key_prefix, config.quota, config.window)
            .context("invalid rate limit configuration")?
            .with_store_timeout(config.store_timeout);

        let user_header = config
            .user_header
            .as_deref()
            .map(HeaderName::try_from)
            .transpose()
            .context("RATE_LIMIT_USER_HEADER must be a valid header name")?;

        Ok(Self::build(
            limiter,
            memory_store,
            config.trust_forwarded,
            user_header,
        ))
    }

    /// Build application state around an existing limiter configuration.
    pub fn from_parts(
        limiter: LimiterConfig,
        trust_forwarded: bool,
        user_header: Option<HeaderName>,
    ) -> Self {
        Self::build(limiter, None, trust_forwarded, user_header)
    }

    fn build(
        limiter: LimiterConfig,
        memory_store: Option<Arc<MemoryCountingStore>>,
        trust_forwarded: bool,
        user_header: Option<HeaderName>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                enforcer: WindowEnforcer::new(limiter),
                memory_store,
                metrics: Arc::new(Metrics::new()),
                trust_forwarded,
                user_header,
            }),
        }
    }

    /// Get the window enforcer.
    pub fn enforcer(&self) -> &WindowEnforcer {
        &self.inner.enforcer
    }

    /// Get the in-process store, if that backend is configured.
    pub fn memory_store(&self) -> Option<&Arc<MemoryCountingStore>> {
        self.inner.memory_store.as_ref()
    }

    /// Get the metrics registry.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.inner.metrics
    }

    pub fn trust_forwarded(&self) -> bool {
        self.inner.trust_forwarded
    }

    pub fn user_header(&self) -> Option<&HeaderName> {
        self.inner.user_header.as_ref()
    }

    /// Check if the counting store is reachable.
    pub async fn store_healthy(&self) -> bool {
        let store = self.inner.enforcer.config().store();
        match tokio::time::timeout(HEALTH_TIMEOUT, store.ping()).await {
            Ok(result) => result.is_ok(),
            Err(_) => {
                store.on_timeout();
                false
            }
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("limiter", self.inner.enforcer.config())
            .field("trust_forwarded", &self.inner.trust_forwarded)
            .field("user_header", &self.inner.user_header)
            .finish_non_exhaustive()
    }
}
