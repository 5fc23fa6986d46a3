use super::{StoreOp, TtlStore};
use crate::clock::Clock;
use crate::error::app_error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at_ms: Option<i64>,
}

impl Entry {
    fn is_live(&self, now_ms: i64) -> bool {
        self.expires_at_ms.is_none_or(|expires_at| now_ms < expires_at)
    }
}

fn expiry_from(now_ms: i64, ttl_seconds: u64) -> Option<i64> {
    let ttl_ms = i64::try_from(ttl_seconds.saturating_mul(1000)).unwrap_or(i64::MAX);
    Some(now_ms.saturating_add(ttl_ms))
}

/// Single-process store. Expiry follows the injected clock, so tests can fast-forward
/// through TTLs and rate-limit windows.
#[derive(Debug)]
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Periodically drops expired entries. Reads already ignore them; this only bounds
    /// memory.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = self.sweep().await;
                if removed > 0 {
                    debug!(removed, "swept expired keys");
                }
            }
        });
    }

    async fn sweep(&self) -> usize {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    fn live<'a>(entries: &'a HashMap<String, Entry>, key: &str, now: i64) -> Option<&'a Entry> {
        entries.get(key).filter(|entry| entry.is_live(now))
    }

    fn parse_counter(key: &str, entry: Option<&Entry>) -> Result<i64, AppError> {
        match entry {
            None => Ok(0),
            Some(entry) => entry.value.parse::<i64>().map_err(|_| AppError::Store {
                message: format!("value at {} is not an integer", key),
                source: None,
            }),
        }
    }

    /// INCR semantics: a missing or expired key starts from zero with no expiry, an
    /// existing key keeps its expiry.
    fn increment(entries: &mut HashMap<String, Entry>, key: &str, now: i64) -> Result<(i64, bool), AppError> {
        let current = Self::live(entries, key, now);
        let fresh = current.is_none();
        let count = Self::parse_counter(key, current)? + 1;
        let expires_at_ms = current.and_then(|entry| entry.expires_at_ms);

        entries.insert(
            key.to_string(),
            Entry {
                value: count.to_string(),
                expires_at_ms,
            },
        );

        Ok((count, fresh))
    }
}

#[async_trait::async_trait]
impl TtlStore for MemoryStore {
    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), AppError> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at_ms: expiry_from(now, ttl_seconds),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let now = self.clock.now_millis();
        let entries = self.entries.lock().await;
        Ok(Self::live(&entries, key, now).map(|entry| entry.value.clone()))
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, AppError> {
        let now = self.clock.now_millis();
        let entries = self.entries.lock().await;
        Ok(keys
            .iter()
            .map(|key| Self::live(&entries, key, now).map(|entry| entry.value.clone()))
            .collect())
    }

    async fn del(&self, keys: &[String]) -> Result<(), AppError> {
        let mut entries = self.entries.lock().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, AppError> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().await;
        let (count, _) = Self::increment(&mut entries, key, now)?;
        Ok(count)
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<(), AppError> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(key).filter(|entry| entry.is_live(now)) {
            entry.expires_at_ms = expiry_from(now, ttl_seconds);
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, AppError> {
        let now = self.clock.now_millis();
        let entries = self.entries.lock().await;
        Ok(Self::live(&entries, key, now)
            .and_then(|entry| entry.expires_at_ms)
            .map(|expires_at| u64::try_from((expires_at - now) / 1000).unwrap_or(0)))
    }

    async fn write_batch(&self, ops: &[StoreOp]) -> Result<(), AppError> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().await;
        for op in ops {
            match op {
                StoreOp::SetEx { key, value, ttl_seconds } => {
                    entries.insert(
                        key.clone(),
                        Entry {
                            value: value.clone(),
                            expires_at_ms: expiry_from(now, *ttl_seconds),
                        },
                    );
                }
                StoreOp::Del { key } => {
                    entries.remove(key);
                }
            }
        }
        Ok(())
    }

    async fn incr_with_expiry(&self, key: &str, ttl_seconds: u64) -> Result<i64, AppError> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().await;
        let (count, fresh) = Self::increment(&mut entries, key, now)?;

        if let Some(entry) = entries.get_mut(key)
            && (fresh || entry.expires_at_ms.is_none())
        {
            entry.expires_at_ms = expiry_from(now, ttl_seconds);
        }

        Ok(count)
    }

    async fn incr_if_exists(&self, guard: &str, key: &str, ttl_seconds: u64) -> Result<Option<i64>, AppError> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().await;
        if Self::live(&entries, guard, now).is_none() {
            return Ok(None);
        }

        let (count, _) = Self::increment(&mut entries, key, now)?;
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at_ms = expiry_from(now, ttl_seconds);
        }

        Ok(Some(count))
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}
