//! Sliding-window rate limiting.
//!
//! The window lives in a shared counting store so every service instance
//! sees the same counts. The enforcer itself holds no mutable state.

mod config;
mod enforcer;
mod error;
mod key;
pub mod store;

pub use config::{DEFAULT_STORE_TIMEOUT, LimiterConfig, MAX_WINDOW};
pub use enforcer::{Decision, RateLimitStatus, WindowEnforcer};
pub use error::{LimiterError, StoreError};
pub use key::{AuthenticatedUser, ClientIdentity, ClientKey};
pub use store::{CountingStore, MemoryCountingStore, RedisCountingStore};
