//! Gateway error taxonomy
//!
//! Every variant renders as a JSON object with a single `error` key. Upstream
//! non-2xx responses are not represented here: they are relayed verbatim.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("method and targetPath required")]
    InvalidRequest,

    #[error("path not allowed")]
    PathNotAllowed,

    #[error(transparent)]
    CredentialExchange(#[from] filevine_auth::Error),

    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::InvalidRequest => StatusCode::BAD_REQUEST,
            GatewayError::PathNotAllowed => StatusCode::FORBIDDEN,
            GatewayError::CredentialExchange(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn client_errors_use_fixed_messages() {
        let cases = [
            (GatewayError::Unauthorized, 401, "Unauthorized"),
            (
                GatewayError::InvalidRequest,
                400,
                "method and targetPath required",
            ),
            (GatewayError::PathNotAllowed, 403, "path not allowed"),
        ];
        for (err, status, message) in cases {
            let response = err.into_response();
            assert_eq!(response.status().as_u16(), status);
            assert_eq!(body_json(response).await, serde_json::json!({ "error": message }));
        }
    }

    #[tokio::test]
    async fn credential_exchange_failure_is_500_with_underlying_message() {
        let err = GatewayError::from(filevine_auth::Error::TokenExchange {
            status: 401,
            body: serde_json::json!({"error": "invalid_client"}),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await["error"],
            r#"Token exchange failed: 401 {"error":"invalid_client"}"#
        );
    }

    #[test]
    fn internal_error_keeps_message() {
        let err = GatewayError::Internal("upstream request failed: connection refused".into());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "upstream request failed: connection refused");
    }
}
