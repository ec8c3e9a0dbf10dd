//! Turnstile
//!
//! Sliding-window request governor for HTTP services. Per-client request
//! counts live in a shared Redis sorted set so every instance enforces the
//! same quota; when Redis is unreachable the governor fails open.

pub mod config;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod ratelimit;
pub mod routes;
pub mod state;

pub use config::Config;
pub use state::AppState;
