//! In-memory bearer token cache
//!
//! Holds exactly one bearer token and its absolute expiry. Reads take a
//! shared lock; a refresh takes the exclusive lock and re-checks freshness
//! first, so concurrent misses collapse into a single exchange.
//!
//! A failed exchange never touches the cached entry.

use std::sync::Arc;

use common::Secret;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::constants::REFRESH_MARGIN_SECS;
use crate::error::Result;
use crate::token::{Credentials, exchange_personal_access_token};

/// The single cached bearer token. Value and expiry are always replaced together.
struct CachedToken {
    value: Secret<String>,
    expires_at_epoch_secs: u64,
}

impl CachedToken {
    fn is_fresh(&self, now: u64) -> bool {
        self.expires_at_epoch_secs.saturating_sub(REFRESH_MARGIN_SECS) > now
    }
}

/// Owner of the process-wide bearer token.
pub struct TokenCache {
    client: reqwest::Client,
    endpoint: String,
    credentials: Credentials,
    clock: Arc<dyn Clock>,
    slot: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    /// Create an empty cache that exchanges against `endpoint` using wall-clock time.
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, credentials: Credentials) -> Self {
        Self::with_clock(client, endpoint, credentials, Arc::new(SystemClock))
    }

    pub fn with_clock(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        credentials: Credentials,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            credentials,
            clock,
            slot: RwLock::new(None),
        }
    }

    /// Return a bearer token that is valid for at least the refresh margin.
    ///
    /// Fast path returns the cached value without network I/O. Otherwise one
    /// caller performs the exchange while the others wait on the lock and
    /// then reuse its result.
    pub async fn acquire_token(&self) -> Result<String> {
        {
            let slot = self.slot.read().await;
            if let Some(token) = slot.as_ref() {
                if token.is_fresh(self.clock.now_epoch_secs()) {
                    return Ok(token.value.expose().clone());
                }
            }
        }

        let mut slot = self.slot.write().await;

        if let Some(token) = slot.as_ref() {
            if token.is_fresh(self.clock.now_epoch_secs()) {
                debug!("bearer token refreshed by a concurrent caller");
                return Ok(token.value.expose().clone());
            }
        }

        let response =
            match exchange_personal_access_token(&self.client, &self.endpoint, &self.credentials)
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    metrics::counter!("connector_token_exchanges_total", "outcome" => "failure")
                        .increment(1);
                    warn!(error = %e, "credential exchange failed, cache left unchanged");
                    return Err(e);
                }
            };
        metrics::counter!("connector_token_exchanges_total", "outcome" => "success").increment(1);

        let lifetime = response.lifetime_secs();
        let expires_at_epoch_secs = self.clock.now_epoch_secs().saturating_add(lifetime);
        let value = response.access_token;
        *slot = Some(CachedToken {
            value: Secret::new(value.clone()),
            expires_at_epoch_secs,
        });
        info!(expires_in = lifetime, expires_at = expires_at_epoch_secs, "bearer token refreshed");

        Ok(value)
    }

    /// Expiry of the cached token, if one is held.
    #[cfg(test)]
    pub(crate) async fn cached_expiry(&self) -> Option<u64> {
        self.slot
            .read()
            .await
            .as_ref()
            .map(|token| token.expires_at_epoch_secs)
    }

    /// Drop the cached token so the next call performs an exchange.
    #[cfg(test)]
    pub(crate) async fn invalidate(&self) {
        *self.slot.write().await = None;
        debug!("bearer token invalidated");
    }
}
