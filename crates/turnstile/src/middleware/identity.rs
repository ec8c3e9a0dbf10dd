//! Trusted user-id header.
//!
//! When the service runs behind a gateway that has already authenticated
//! the caller, the gateway forwards the user id in a configured header.
//! This layer turns that header into an [`AuthenticatedUser`] extension.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::trace;

use crate::ratelimit::AuthenticatedUser;
use crate::state::AppState;

/// Attach the gateway-provided user id to the request.
///
/// An identity already set by an in-process layer wins. Missing or blank
/// headers leave the request anonymous.
pub async fn attach_user_from_header(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if request.extensions().get::<AuthenticatedUser>().is_some() {
        return next.run(request).await;
    }

    let Some(header) = state.user_header() else {
        return next.run(request).await;
    };

    let user_id = request
        .headers()
        .get(header)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string);

    if let Some(user_id) = user_id {
        trace!(user_id = %user_id, "user attributed from gateway header");
        request.extensions_mut().insert(AuthenticatedUser(user_id));
    }

    next.run(request).await
}
