pub mod keys;
pub mod memory;
pub mod redis_store;

use crate::clock::Clock;
use crate::config::{StoreBackend, StoreConfig};
use crate::error::app_error::AppError;
use std::sync::Arc;
use tracing::warn;

/// One write in a [`TtlStore::write_batch`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    SetEx { key: String, value: String, ttl_seconds: u64 },
    Del { key: String },
}

/// String/counter store with per-key expiry.
///
/// Single-key operations are atomic. `write_batch` is sent as one round trip but is not
/// required to be atomic across keys.
#[async_trait::async_trait]
pub trait TtlStore: Send + Sync {
    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), AppError>;
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, AppError>;
    async fn del(&self, keys: &[String]) -> Result<(), AppError>;
    async fn incr(&self, key: &str) -> Result<i64, AppError>;
    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<(), AppError>;
    /// Remaining lifetime in seconds, `None` when the key is missing or has no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<u64>, AppError>;
    async fn write_batch(&self, ops: &[StoreOp]) -> Result<(), AppError>;

    /// Increments `key` and, when this creates the key (or the key has no expiry), sets
    /// its TTL in the same atomic step. Returns the new count.
    async fn incr_with_expiry(&self, key: &str, ttl_seconds: u64) -> Result<i64, AppError>;

    /// Increments `key` and refreshes its TTL, but only while `guard` exists.
    /// Returns `None` without touching `key` when `guard` is gone.
    async fn incr_if_exists(&self, guard: &str, key: &str, ttl_seconds: u64) -> Result<Option<i64>, AppError>;

    async fn ping(&self) -> Result<(), AppError>;
}

/// Opens the configured backend.
pub async fn connect(config: &StoreConfig, clock: Arc<dyn Clock>) -> Result<Arc<dyn TtlStore>, AppError> {
    match config.backend {
        StoreBackend::Redis => {
            let timeout = std::time::Duration::from_secs(config.connect_timeout_seconds.max(1));
            let store: Arc<dyn TtlStore> = Arc::new(redis_store::RedisStore::open(&config.url, timeout)?);

            // Serving starts even while Redis is down; store calls answer 503 until it is reachable.
            let warmup = store.clone();
            tokio::spawn(async move {
                if let Err(e) = warmup.ping().await {
                    warn!(error = ?e, "Redis is not reachable yet");
                }
            });

            Ok(store)
        }
        StoreBackend::Memory => {
            let store = Arc::new(memory::MemoryStore::new(clock));
            store.clone().spawn_sweeper(std::time::Duration::from_secs(config.sweep_interval_seconds.max(1)));
            Ok(store)
        }
    }
}
