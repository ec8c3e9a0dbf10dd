//! Rate limiting middleware.
//!
//! Runs the sliding-window check before any handler. Allowed requests get
//! the `X-RateLimit-*` headers on their response, rejected requests are
//! answered with 429 and never reach the handler, and a failed store
//! transaction lets the request through untouched.

use std::net::SocketAddr;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::AppError;
use crate::ratelimit::{AuthenticatedUser, ClientIdentity, Decision, RateLimitStatus};
use crate::state::AppState;

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// Enforce the per-client request quota.
pub async fn enforce_rate_limit(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let identity = ClientIdentity::resolve(request.extensions().get::<AuthenticatedUser>(), || {
        let addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        get_client_id(addr, request.headers(), state.trust_forwarded())
    });

    let started = Instant::now();
    let decision = state.enforcer().enforce(&identity).await;
    state
        .metrics()
        .record_decision(&decision, started.elapsed().as_secs_f64());

    match decision {
        Decision::Allowed(status) => {
            let mut response = next.run(request).await;
            apply_rate_limit_headers(response.headers_mut(), &status);
            response
        }
        Decision::Rejected(status) => AppError::TooManyRequests(status).into_response(),
        Decision::FailOpen => next.run(request).await,
    }
}

/// Write the three advisory rate-limit headers.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, status: &RateLimitStatus) {
    headers.insert(
        HeaderName::from_static(X_RATELIMIT_LIMIT),
        HeaderValue::from(status.limit),
    );
    headers.insert(
        HeaderName::from_static(X_RATELIMIT_REMAINING),
        HeaderValue::from(status.remaining),
    );
    headers.insert(
        HeaderName::from_static(X_RATELIMIT_RESET),
        HeaderValue::from(status.reset_at),
    );
}

/// Get the client identifier (IP address) for rate limiting.
///
/// Forwarded headers are only consulted when `trust_forwarded` is set;
/// otherwise any client could pick its own quota bucket.
pub fn get_client_id(
    addr: Option<SocketAddr>,
    headers: &HeaderMap,
    trust_forwarded: bool,
) -> String {
    if trust_forwarded {
        // Check X-Forwarded-For header first (for proxied requests)
        if let Some(forwarded) = headers.get("x-forwarded-for")
            && let Ok(value) = forwarded.to_str()
            && let Some(ip) = value.split(',').next().map(str::trim)
            && !ip.is_empty()
        {
            // Take the first IP in the chain
            return ip.to_string();
        }

        if let Some(real_ip) = headers.get("x-real-ip")
            && let Ok(value) = real_ip.to_str()
            && !value.trim().is_empty()
        {
            return value.trim().to_string();
        }
    }

    // Fall back to connection address
    addr.map(|a| a.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn addr() -> Option<SocketAddr> {
        Some("203.0.113.7:51000".parse().unwrap())
    }

    #[test]
    fn test_client_id_from_connection() {
        let headers = HeaderMap::new();
        assert_eq!(get_client_id(addr(), &headers, false), "203.0.113.7");
        assert_eq!(get_client_id(None, &headers, false), "unknown");
    }

    #[test]
    fn test_forwarded_ignored_unless_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "198.51.100.1".parse().unwrap());
        assert_eq!(get_client_id(addr(), &headers, false), "203.0.113.7");
    }

    #[test]
    fn test_forwarded_first_hop_when_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "198.51.100.1, 10.0.0.2, 10.0.0.3".parse().unwrap(),
        );
        headers.insert("x-real-ip", "192.0.2.44".parse().unwrap());
        assert_eq!(get_client_id(addr(), &headers, true), "198.51.100.1");
    }

    #[test]
    fn test_real_ip_when_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "192.0.2.44".parse().unwrap());
        assert_eq!(get_client_id(addr(), &headers, true), "192.0.2.44");
    }

    #[test]
    fn test_blank_forwarded_falls_through() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", " ".parse().unwrap());
        assert_eq!(get_client_id(addr(), &headers, true), "203.0.113.7");
    }

    #[test]
    fn test_apply_headers() {
        let mut headers = HeaderMap::new();
        let status = RateLimitStatus {
            limit: 5,
            count: 7,
            remaining: 0,
            reset_at: 1_700_000_060,
            retry_after: 60,
        };
        apply_rate_limit_headers(&mut headers, &status);

        assert_eq!(headers["x-ratelimit-limit"], "5");
        assert_eq!(headers["x-ratelimit-remaining"], "0");
        assert_eq!(headers["x-ratelimit-reset"], "1700000060");
    }
}
