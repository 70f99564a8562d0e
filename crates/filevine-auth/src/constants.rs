//! Filevine identity provider constants
//!
//! These identify the grant and scopes the gateway asks for. The actual
//! secrets (personal access token, client secret) come from configuration.

/// Default token endpoint for the personal access token exchange
pub const DEFAULT_IDENTITY_URL: &str = "https://identity.filevine.com/connect/token";

/// Grant type for exchanging a personal access token
pub const GRANT_TYPE: &str = "personal_access_token";

/// Scopes requested on every exchange.
pub const SCOPES: &str =
    "fv.api.gateway.access tenant filevine.v2.api.* openid email fv.auth.tenant.read";

/// Lifetime assumed when the provider omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

/// A cached token is refreshed once it is within this many seconds of expiry.
pub const REFRESH_MARGIN_SECS: u64 = 60;
