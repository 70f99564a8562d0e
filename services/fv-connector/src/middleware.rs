//! Request logging and connector-key authentication

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use common::Secret;
use tracing::{info, warn};

use crate::error::GatewayError;

/// Header carrying the shared secret callers present to the connector.
pub const CONNECTOR_KEY_HEADER: &str = "x-connector-key";

/// Log every inbound request (method + path and query).
pub async fn log_request(request: Request, next: Next) -> Response {
    info!(method = %request.method(), uri = %request.uri(), "inbound request");
    next.run(request).await
}

/// Reject requests whose `x-connector-key` header is missing or wrong.
pub async fn require_connector_key(
    State(connector_key): State<Arc<Secret<String>>>,
    request: Request,
    next: Next,
) -> Response {
    let header = request.headers().get(CONNECTOR_KEY_HEADER);
    let key_present = header.is_some();
    let authorized = header
        .and_then(|v| v.to_str().ok())
        .is_some_and(|key| connector_key.matches(key));

    if authorized {
        return next.run(request).await;
    }

    warn!(
        path = %request.uri().path(),
        key_present,
        "rejected request without a valid connector key"
    );
    GatewayError::Unauthorized.into_response()
}
