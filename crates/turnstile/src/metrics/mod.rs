//! Prometheus metrics collection.
//!
//! Counts rate-limit decisions and times the counting-store round trip.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;

use crate::ratelimit::Decision;

/// Application metrics.
pub struct Metrics {
    registry: Registry,

    /// Requests admitted within quota.
    pub rate_limit_allowed: Counter,

    /// Requests rejected with 429.
    pub rate_limit_rejections: Counter,

    /// Requests admitted because the store transaction failed.
    pub rate_limit_fail_open: Counter,

    /// Duration of the enforcement call, dominated by the store round trip.
    pub store_duration_seconds: Histogram,
}

impl Metrics {
    /// Create a new metrics registry.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let rate_limit_allowed = Counter::default();
        registry.register(
            "rate_limit_allowed",
            "Requests allowed by the rate limiter",
            rate_limit_allowed.clone(),
        );

        let rate_limit_rejections = Counter::default();
        registry.register(
            "rate_limit_rejections",
            "Rate limit rejections",
            rate_limit_rejections.clone(),
        );

        let rate_limit_fail_open = Counter::default();
        registry.register(
            "rate_limit_fail_open",
            "Requests allowed because the counting store was unavailable",
            rate_limit_fail_open.clone(),
        );

        let store_duration_seconds = Histogram::new(exponential_buckets(0.0001, 2.0, 14));
        registry.register(
            "rate_limit_store_duration_seconds",
            "Rate limit store transaction duration in seconds",
            store_duration_seconds.clone(),
        );

        Self {
            registry,
            rate_limit_allowed,
            rate_limit_rejections,
            rate_limit_fail_open,
            store_duration_seconds,
        }
    }

    /// Record the outcome of one enforcement call.
    pub fn record_decision(&self, decision: &Decision, duration_secs: f64) {
        match decision {
            Decision::Allowed(_) => self.rate_limit_allowed.inc(),
            Decision::Rejected(_) => self.rate_limit_rejections.inc(),
            Decision::FailOpen => self.rate_limit_fail_open.inc(),
        };
        self.store_duration_seconds.observe(duration_secs);
    }

    /// Encode metrics in Prometheus text format.
    ///
    /// # Panics
    ///
    /// Panics if Prometheus metric encoding to a `String` buffer fails.
    /// The `fmt::Write` impl for `String` is infallible.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        // Prometheus encoding to String buffer is infallible
        #[allow(clippy::expect_used)]
        encode(&mut buffer, &self.registry).expect("encoding metrics");
        buffer
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish()
    }
}
