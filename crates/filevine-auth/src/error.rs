//! Error types for credential exchange

/// Errors from the identity provider exchange.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The provider answered with a non-success status. `body` is the parsed
    /// error payload, or the raw text as a JSON string if it was not JSON.
    #[error("Token exchange failed: {status} {body}")]
    TokenExchange {
        status: u16,
        body: serde_json::Value,
    },

    #[error("invalid token response: {0}")]
    InvalidResponse(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
