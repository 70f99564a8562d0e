//! Personal access token exchange
//!
//! POSTs the long-lived personal access token plus client credentials to the
//! identity provider and returns the short-lived bearer token it issues.
//! The provider puts error detail in the body even on failure, so the body
//! is read and parsed before the status is checked.

use common::Secret;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::constants::{DEFAULT_TOKEN_LIFETIME_SECS, GRANT_TYPE, SCOPES};
use crate::error::{Error, Result};

/// Long-lived credentials presented to the identity provider.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub personal_access_token: Secret<String>,
    pub client_id: String,
    pub client_secret: Secret<String>,
}

/// Successful response from the token endpoint.
///
/// `expires_in` is a delta in seconds from the response time. The cache
/// converts it to an absolute epoch timestamp. It is kept as raw JSON because
/// providers are loose about its type (`3600`, `3599.5`, `"3600"`).
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<Value>,
}

impl TokenResponse {
    /// Token lifetime in whole seconds.
    ///
    /// Fractions are truncated. Anything that is not a positive number
    /// (missing, zero, negative, non-numeric) means one hour.
    pub fn lifetime_secs(&self) -> u64 {
        let secs = match &self.expires_in {
            Some(Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().and_then(whole_secs)),
            Some(Value::String(s)) => s
                .trim()
                .parse::<u64>()
                .ok()
                .or_else(|| s.trim().parse::<f64>().ok().and_then(whole_secs)),
            _ => None,
        };
        secs.filter(|&secs| secs > 0)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS)
    }
}

fn whole_secs(secs: f64) -> Option<u64> {
    // `as` saturates at u64::MAX
    (secs.is_finite() && secs > 0.0).then_some(secs as u64)
}

/// Exchange the personal access token for a bearer token.
///
/// Non-success statuses become `Error::TokenExchange` carrying the provider's
/// payload. A success status with an unusable body is `Error::InvalidResponse`.
pub async fn exchange_personal_access_token(
    client: &reqwest::Client,
    endpoint: &str,
    credentials: &Credentials,
) -> Result<TokenResponse> {
    let response = client
        .post(endpoint)
        .form(&[
            ("grant_type", GRANT_TYPE),
            ("token", credentials.personal_access_token.expose().as_str()),
            ("scope", SCOPES),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.expose().as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| Error::Http(format!("reading token response failed: {e}")))?;
    let parsed = serde_json::from_str::<Value>(&text).ok();
    debug!(status = status.as_u16(), json = parsed.is_some(), "token endpoint responded");

    if !status.is_success() {
        return Err(Error::TokenExchange {
            status: status.as_u16(),
            body: parsed.unwrap_or(Value::String(text)),
        });
    }

    let body = parsed.ok_or_else(|| {
        Error::InvalidResponse(format!("token endpoint returned non-JSON body: {text}"))
    })?;
    serde_json::from_value(body).map_err(|e| Error::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockIdentity, Reply, test_credentials};

    #[test]
    fn token_response_defaults_lifetime() {
        let token: TokenResponse = serde_json::from_str(r#"{"access_token":"at_abc"}"#).unwrap();
        assert_eq!(token.access_token, "at_abc");
        assert_eq!(token.lifetime_secs(), 3600);

        let zero: TokenResponse =
            serde_json::from_str(r#"{"access_token":"at_abc","expires_in":0}"#).unwrap();
        assert_eq!(zero.lifetime_secs(), 3600);

        let explicit: TokenResponse =
            serde_json::from_str(r#"{"access_token":"at_abc","expires_in":900}"#).unwrap();
        assert_eq!(explicit.lifetime_secs(), 900);
    }

    #[test]
    fn token_response_accepts_loosely_typed_lifetime() {
        let lifetime = |raw: &str| {
            let body = format!(r#"{{"access_token":"at_abc","expires_in":{raw}}}"#);
            serde_json::from_str::<TokenResponse>(&body)
                .unwrap()
                .lifetime_secs()
        };

        assert_eq!(lifetime("900.7"), 900);
        assert_eq!(lifetime(r#""1800""#), 1800);
        assert_eq!(lifetime(r#"" 120.5 ""#), 120);
        assert_eq!(lifetime("18446744073709551615"), u64::MAX);
        assert_eq!(lifetime("1e300"), u64::MAX);

        for fallback in ["-5", "0.4", "null", "true", r#""soon""#, "[]", "{}"] {
            assert_eq!(lifetime(fallback), 3600, "expires_in = {fallback}");
        }
    }

    #[tokio::test]
    async fn exchange_sends_form_fields() {
        let mock = MockIdentity::start(Reply::Token {
            expires_in: Some(1800),
        })
        .await;

        let token =
            exchange_personal_access_token(&reqwest::Client::new(), &mock.url, &test_credentials())
                .await
                .unwrap();
        assert_eq!(token.access_token, "tok-1");
        assert_eq!(token.lifetime_secs(), 1800);

        let form = mock.last_form().expect("identity provider saw a request");
        assert_eq!(form["grant_type"], "personal_access_token");
        assert_eq!(form["token"], "pat-123");
        assert_eq!(form["client_id"], "client-abc");
        assert_eq!(form["client_secret"], "shh");
        assert_eq!(
            form["scope"],
            "fv.api.gateway.access tenant filevine.v2.api.* openid email fv.auth.tenant.read"
        );
    }

    #[tokio::test]
    async fn exchange_failure_carries_status_and_json_payload() {
        let mock = MockIdentity::start(Reply::Body {
            status: 400,
            body: r#"{"error":"invalid_grant"}"#,
        })
        .await;

        let err =
            exchange_personal_access_token(&reqwest::Client::new(), &mock.url, &test_credentials())
                .await
                .unwrap_err();
        match err {
            Error::TokenExchange { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body["error"], "invalid_grant");
            }
            other => panic!("expected TokenExchange, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exchange_failure_keeps_non_json_payload_as_text() {
        let mock = MockIdentity::start(Reply::Body {
            status: 502,
            body: "bad gateway",
        })
        .await;

        let err =
            exchange_personal_access_token(&reqwest::Client::new(), &mock.url, &test_credentials())
                .await
                .unwrap_err();
        assert_eq!(err.to_string(), r#"Token exchange failed: 502 "bad gateway""#);
    }

    #[tokio::test]
    async fn exchange_rejects_success_without_token() {
        let mock = MockIdentity::start(Reply::Body {
            status: 200,
            body: r#"{"token_type":"Bearer"}"#,
        })
        .await;

        let err =
            exchange_personal_access_token(&reqwest::Client::new(), &mock.url, &test_credentials())
                .await
                .unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn exchange_reports_unreachable_provider() {
        let err = exchange_personal_access_token(
            &reqwest::Client::new(),
            "http://127.0.0.1:1/connect/token",
            &test_credentials(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Http(_)), "got {err:?}");
    }
}
