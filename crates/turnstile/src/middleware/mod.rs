//! HTTP middleware components.
//!
//! Provides the rate limiting interception point and the identity layer
//! that feeds it.

pub mod identity;
pub mod rate_limit;

pub use identity::attach_user_from_header;
pub use rate_limit::{apply_rate_limit_headers, enforce_rate_limit, get_client_id};
