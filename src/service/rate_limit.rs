use crate::error::app_error::AppError;
use crate::store::TtlStore;
use std::sync::Arc;

/// Fixed-window counters kept in the TTL store.
///
/// The window starts at the first hit on a fresh key and ends when the key expires.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn TtlStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn TtlStore>) -> Self {
        Self { store }
    }

    /// Counts one event against `key`. Returns `true` when the count after this hit is
    /// strictly greater than `limit`.
    pub async fn hit(&self, key: &str, limit: u64, window_seconds: u64) -> Result<bool, AppError> {
        let count = self.store.incr_with_expiry(key, window_seconds).await?;
        Ok(u64::try_from(count).unwrap_or(0) > limit)
    }

    /// Seconds until the window at `key` closes, never less than one.
    pub async fn retry_after(&self, key: &str) -> Result<u64, AppError> {
        Ok(self.store.ttl(key).await?.unwrap_or(1).max(1))
    }
}
