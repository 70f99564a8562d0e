//! Filevine identity-provider authentication
//!
//! Exchanges a long-lived personal access token for a short-lived bearer
//! token and keeps exactly one bearer token cached in memory.
//!
//! Token flow:
//! 1. `TokenCache::acquire_token()` checks the cached token against a
//!    60-second safety margin
//! 2. On a miss, `token::exchange_personal_access_token()` POSTs the
//!    credentials to the identity provider
//! 3. The new token replaces the cached one; failures leave the cache as is

pub mod cache;
pub mod clock;
pub mod constants;
pub mod error;
pub mod token;

#[cfg(test)]
mod test_support;

pub use cache::TokenCache;
pub use clock::{Clock, SystemClock};
pub use constants::*;
pub use error::{Error, Result};
pub use token::{Credentials, TokenResponse, exchange_personal_access_token};
