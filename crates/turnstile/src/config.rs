//! Configuration loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Which counting store backs the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Shared Redis instance; correct across many service instances.
    Redis,
    /// In-process map; only correct for a single instance.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => bail!("unknown rate limit backend '{other}', expected 'redis' or 'memory'"),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 3000).
    pub port: u16,

    /// Redis connection URL.
    pub redis_url: String,

    /// Counting store backend (default: redis).
    pub backend: StoreBackend,

    /// Namespace prepended to every counting key (default: "ratelimit:").
    pub key_prefix: String,

    /// Requests allowed per window (default: 100).
    pub quota: u32,

    /// Sliding window length (default: 60s).
    pub window: Duration,

    /// Bound on a single store transaction (default: 250ms).
    pub store_timeout: Duration,

    /// Honour X-Forwarded-For / X-Real-IP when resolving the client address.
    /// Only enable behind a trusted proxy (default: false).
    pub trust_forwarded: bool,

    /// Header carrying a user id resolved by an upstream gateway. When unset,
    /// only in-process authentication layers can attribute a user.
    pub user_header: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("PORT must be a valid u16")?;

        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let backend = env::var("RATE_LIMIT_BACKEND")
            .unwrap_or_else(|_| "redis".to_string())
            .parse()
            .context("RATE_LIMIT_BACKEND must be 'redis' or 'memory'")?;

        let key_prefix =
            env::var("RATE_LIMIT_KEY_PREFIX").unwrap_or_else(|_| "ratelimit:".to_string());

        let quota = env::var("RATE_LIMIT_QUOTA")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .context("RATE_LIMIT_QUOTA must be a valid u32")?;

        let window_secs: u64 = env::var("RATE_LIMIT_WINDOW_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .context("RATE_LIMIT_WINDOW_SECS must be a valid u64")?;

        let store_timeout_ms: u64 = env::var("RATE_LIMIT_STORE_TIMEOUT_MS")
            .unwrap_or_else(|_| "250".to_string())
            .parse()
            .context("RATE_LIMIT_STORE_TIMEOUT_MS must be a valid u64")?;

        let trust_forwarded = env::var("RATE_LIMIT_TRUST_FORWARDED")
            .map(|v| parse_bool(&v))
            .unwrap_or(false);

        let user_header = env::var("RATE_LIMIT_USER_HEADER")
            .ok()
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty());

        Ok(Self {
            port,
            redis_url,
            backend,
            key_prefix,
            quota,
            window: Duration::from_secs(window_secs),
            store_timeout: Duration::from_millis(store_timeout_ms),
            trust_forwarded,
            user_header,
        })
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
