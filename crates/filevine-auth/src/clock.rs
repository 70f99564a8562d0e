//! Wall-clock source for token expiry checks

use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current unix time in whole seconds.
///
/// Token expiry is tracked as an absolute epoch timestamp, so the cache asks
/// the clock instead of reading `SystemTime` directly.
pub trait Clock: Send + Sync {
    fn now_epoch_secs(&self) -> u64;
}

/// Zero-sized type - delegates to `SystemTime::now()`.
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now_epoch_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}
