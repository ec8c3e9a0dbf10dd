//! Rate-limited API surface.

use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct PingResponse {
    status: &'static str,
}

async fn ping() -> Json<PingResponse> {
    Json(PingResponse { status: "ok" })
}

/// Create the API router. Callers wrap it in the rate limiting layer.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/ping", get(ping))
}
