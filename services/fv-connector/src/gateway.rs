//! Forwarding gateway
//!
//! Validates an inbound proxy request, attaches a bearer token, calls the
//! Filevine API, and relays the upstream status and body. Upstream error
//! statuses are relayed verbatim; only gateway-side failures become
//! `GatewayError`s.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use filevine_auth::TokenCache;
use serde::Deserialize;
use serde_json::Value;
use tracing::{Span, error, info, instrument, warn};

use crate::config::FilevineConfig;
use crate::error::GatewayError;
use crate::metrics;

/// Upstream path prefixes a caller may reach, matched case-insensitively.
pub const ALLOWED_PATH_PREFIXES: &[&str] = &[
    "/fv-app/v2/projects",
    "/fv-app/v2/documents",
    "/fv-app/v2/billing",
    "/fv-app/v2/notes",
    "/fv-app/v2/contacts",
];

static ORG_ID_HEADER: HeaderName = HeaderName::from_static("x-fv-orgid");
static USER_ID_HEADER: HeaderName = HeaderName::from_static("x-fv-userid");

/// Inbound body of `POST /fv`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequest {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub target_path: Option<String>,
    #[serde(default)]
    pub query: Option<serde_json::Map<String, Value>>,
    #[serde(default)]
    pub body: Option<Value>,
}

impl ProxyRequest {
    /// Parse the raw request body. Anything that is not a JSON object with
    /// the expected field types is rejected as an invalid request.
    pub fn parse(raw: &[u8]) -> Result<Self, GatewayError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_slice(raw).map_err(|_| GatewayError::InvalidRequest)?;
        if !value.is_object() {
            return Err(GatewayError::InvalidRequest);
        }
        serde_json::from_value(value).map_err(|_| GatewayError::InvalidRequest)
    }

    /// The non-empty `method` and `targetPath`, or `InvalidRequest`.
    fn required_fields(&self) -> Result<(&str, &str), GatewayError> {
        match (self.method.as_deref(), self.target_path.as_deref()) {
            (Some(method), Some(path)) if !method.is_empty() && !path.is_empty() => {
                Ok((method, path))
            }
            _ => Err(GatewayError::InvalidRequest),
        }
    }
}

/// Upstream body as relayed to the caller.
#[derive(Debug, PartialEq)]
pub enum RelayBody {
    /// Upstream returned valid JSON
    Json(Value),
    /// Upstream returned something else; wrapped as `{"raw": text}`
    Raw(String),
}

impl RelayBody {
    pub fn from_text(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(value) => RelayBody::Json(value),
            Err(_) => RelayBody::Raw(text),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            RelayBody::Json(value) => value,
            RelayBody::Raw(text) => serde_json::json!({ "raw": text }),
        }
    }
}

/// Upstream status and body, ready to hand back to the caller.
#[derive(Debug)]
pub struct Relayed {
    pub status: StatusCode,
    pub body: RelayBody,
}

impl IntoResponse for Relayed {
    fn into_response(self) -> Response {
        (self.status, Json(self.body.into_value())).into_response()
    }
}

/// Whether `target_path` starts with one of the allowed prefixes.
pub fn is_path_allowed(target_path: &str) -> bool {
    ALLOWED_PATH_PREFIXES.iter().any(|prefix| {
        target_path
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    })
}

/// `<api_base><target_path>`, plus `?<urlencoded query>` when a query object was given.
///
/// String values are used as-is; other JSON values use their JSON text
/// (`5`, `true`, `null`).
pub fn build_upstream_url(
    api_base: &str,
    target_path: &str,
    query: Option<&serde_json::Map<String, Value>>,
) -> Result<String, GatewayError> {
    let Some(query) = query else {
        return Ok(format!("{api_base}{target_path}"));
    };

    let pairs: Vec<(&str, String)> = query
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.as_str(), value)
        })
        .collect();
    let encoded = serde_urlencoded::to_string(&pairs)
        .map_err(|e| GatewayError::Internal(format!("invalid query: {e}")))?;

    Ok(format!("{api_base}{target_path}?{encoded}"))
}

/// Methods that carry a JSON body upstream.
pub fn carries_body(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Parse a caller-supplied method name, case-insensitively.
fn parse_method(method: &str) -> Result<Method, GatewayError> {
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|e| GatewayError::Internal(format!("invalid HTTP method {method:?}: {e}")))
}

/// Shared forwarding state: one HTTP client, one token cache, fixed identity headers.
pub struct Gateway {
    client: reqwest::Client,
    tokens: Arc<TokenCache>,
    api_base: String,
    org_id: HeaderValue,
    user_id: HeaderValue,
}

impl Gateway {
    pub fn new(
        client: reqwest::Client,
        tokens: Arc<TokenCache>,
        config: &FilevineConfig,
    ) -> common::Result<Self> {
        let header_value = |key: &str, value: &str| {
            HeaderValue::from_str(value).map_err(|_| {
                common::Error::Config(format!("{key} is not a valid HTTP header value"))
            })
        };

        Ok(Self {
            client,
            tokens,
            api_base: config.api_base.clone(),
            org_id: header_value("FV_ORG_ID", &config.org_id)?,
            user_id: header_value("FV_USER_ID", &config.user_id)?,
        })
    }

    /// Run one request through the gates: shape, whitelist, token, upstream call.
    pub async fn handle(&self, raw_body: &[u8]) -> Result<Relayed, GatewayError> {
        let request = ProxyRequest::parse(raw_body)?;
        let (method, target_path) = request.required_fields()?;
        Span::current().record("target_path", target_path);

        if !is_path_allowed(target_path) {
            return Err(GatewayError::PathNotAllowed);
        }

        let token = self.tokens.acquire_token().await?;

        let url = build_upstream_url(&self.api_base, target_path, request.query.as_ref())?;
        let method = parse_method(method)?;

        let mut upstream = self
            .client
            .request(method.clone(), &url)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(ORG_ID_HEADER.clone(), self.org_id.clone())
            .header(USER_ID_HEADER.clone(), self.user_id.clone())
            .header(header::CONTENT_TYPE, "application/json");

        if carries_body(&method) {
            let payload = match &request.body {
                None | Some(Value::Null) => serde_json::json!({}),
                Some(body) => body.clone(),
            };
            upstream = upstream.body(payload.to_string());
        }

        let response = upstream.send().await.map_err(|e| {
            let error_type = if e.is_timeout() {
                "timeout"
            } else if e.is_connect() {
                "connect"
            } else {
                "request"
            };
            metrics::record_upstream_error(error_type);
            GatewayError::Internal(format!("upstream request failed: {e}"))
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            metrics::record_upstream_error("body");
            GatewayError::Internal(format!("upstream response read error: {e}"))
        })?;

        Ok(Relayed {
            status,
            body: RelayBody::from_text(text),
        })
    }
}

/// Handle one `POST /fv` call and turn the outcome into a response.
#[instrument(skip_all, fields(request_id = %request_id, target_path = tracing::field::Empty))]
pub async fn forward(gateway: &Gateway, raw_body: &[u8], request_id: String) -> Response {
    let started = Instant::now();

    let response = match gateway.handle(raw_body).await {
        Ok(relayed) => {
            info!(status = relayed.status.as_u16(), "relayed upstream response");
            relayed.into_response()
        }
        Err(e) => {
            let status = e.status();
            if status.is_server_error() {
                error!(status = status.as_u16(), error = %e, "proxy request failed");
            } else {
                warn!(status = status.as_u16(), error = %e, "proxy request rejected");
            }
            e.into_response()
        }
    };

    metrics::record_request(
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}
