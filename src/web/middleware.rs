//! HTTP middleware
//!
//! Request logging for every route, and ingress control for the image and
//! upload routes.

use axum::{
    extract::{Request, State},
    http::{Method, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tracing::{info, warn};

use super::AppState;
use super::extractors::ClientId;

/// Request logging middleware
///
/// Logs method, URI, status, client and duration once the response is ready.
pub async fn request_logging_middleware(
    method: Method,
    uri: Uri,
    client: ClientId,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    let status = response.status().as_u16();
    let duration = start.elapsed();

    if status >= 400 {
        warn!(
            method = %method,
            uri = %uri,
            status = status,
            client = %client,
            duration_ms = duration.as_millis(),
            "HTTP request completed with error"
        );
    } else {
        info!(
            method = %method,
            uri = %uri,
            status = status,
            client = %client,
            duration_ms = duration.as_millis(),
            "HTTP request completed"
        );
    }

    response
}

/// Ingress control middleware
///
/// Denies blocked clients outright, then holds an admission slot for the
/// rest of the request and checks the block again once the slot is granted.
/// The slot is released when the permit drops, whether the handler succeeds,
/// fails, panics or the client goes away.
pub async fn ingress_middleware(
    State(state): State<AppState>,
    client: ClientId,
    mut request: Request,
    next: Next,
) -> Response {
    if let Err(e) = state.thumbnails.ensure_not_blocked(client.as_str()) {
        return e.into_response();
    }

    let _permit = match state.gate.acquire().await {
        Ok(permit) => permit,
        Err(e) => return e.into_response(),
    };

    // The client may have been blocked while queued at the gate.
    if let Err(e) = state.thumbnails.ensure_not_blocked(client.as_str()) {
        return e.into_response();
    }

    request.extensions_mut().insert(client);
    next.run(request).await
}
