//! HTTP route handlers.

pub mod api;
pub mod health;
pub mod metrics;

use axum::Router;
use axum::middleware::from_fn_with_state;
use tower_http::trace::TraceLayer;

use crate::middleware::{attach_user_from_header, enforce_rate_limit};
use crate::state::AppState;

/// Build the full application router.
///
/// Health and metrics stay outside the rate limit so probes and scrapes
/// never consume client quota. Unmatched paths are not counted either.
pub fn app(state: AppState) -> Router {
    // Last added = first executed: identity → rate limit → handler
    let limited = api::router()
        .route_layer(from_fn_with_state(state.clone(), enforce_rate_limit))
        .route_layer(from_fn_with_state(state.clone(), attach_user_from_header));

    Router::new()
        .merge(health::router())
        .merge(metrics::router())
        .merge(limited)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
