//! Application error types.

use axum::Json;
use axum::http::StatusCode;
use axum::http::header::RETRY_AFTER;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::middleware::apply_rate_limit_headers;
use crate::ratelimit::RateLimitStatus;

/// Message returned to clients that exceed their quota.
pub const RATE_LIMIT_EXCEEDED_MESSAGE: &str = "Rate limit exceeded";

/// Machine-readable code returned alongside [`RATE_LIMIT_EXCEEDED_MESSAGE`].
pub const RATE_LIMIT_EXCEEDED_CODE: &str = "RATE_LIMIT_EXCEEDED";

/// Errors surfaced to HTTP clients.
///
/// Store failures never appear here: the limiter recovers from them by
/// failing open.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("rate limit exceeded")]
    TooManyRequests(RateLimitStatus),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::TooManyRequests(status) => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(RETRY_AFTER, status.retry_after.to_string())],
                    Json(json!({
                        "error": RATE_LIMIT_EXCEEDED_MESSAGE,
                        "code": RATE_LIMIT_EXCEEDED_CODE,
                    })),
                )
                    .into_response();
                apply_rate_limit_headers(response.headers_mut(), &status);
                response
            }
        }
    }
}
