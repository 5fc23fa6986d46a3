use super::{StoreOp, TtlStore};
use crate::error::app_error::AppError;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::info;

const INCR_WITH_EXPIRY: &str = r"
local count = redis.call('INCR', KEYS[1])
if count == 1 or redis.call('TTL', KEYS[1]) == -1 then
  redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
";

const INCR_IF_EXISTS: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return false
end
local count = redis.call('INCR', KEYS[2])
redis.call('EXPIRE', KEYS[2], ARGV[1])
return count
";

/// Redis-backed store. The connection is opened on first use and cached; until Redis is
/// reachable every call fails with [`AppError::Store`] after at most `connect_timeout`.
/// Once open, the connection manager reconnects on its own and failed commands are not
/// retried here.
pub struct RedisStore {
    client: Client,
    connect_timeout: Duration,
    connection: OnceCell<ConnectionManager>,
    incr_with_expiry_script: Script,
    incr_if_exists_script: Script,
}

impl RedisStore {
    /// Validates `url` without touching the network.
    pub fn open(url: &str, connect_timeout: Duration) -> Result<Self, AppError> {
        let client = Client::open(url).map_err(|e| AppError::store("Invalid Redis URL", e))?;

        Ok(Self {
            client,
            connect_timeout,
            connection: OnceCell::new(),
            incr_with_expiry_script: Script::new(INCR_WITH_EXPIRY),
            incr_if_exists_script: Script::new(INCR_IF_EXISTS),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, AppError> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                match tokio::time::timeout(self.connect_timeout, ConnectionManager::new(self.client.clone())).await {
                    Ok(Ok(connection)) => {
                        info!("connected to Redis");
                        Ok(connection)
                    }
                    Ok(Err(e)) => Err(AppError::store("Failed to connect to Redis", e)),
                    Err(_) => Err(AppError::Store {
                        message: format!("Timed out connecting to Redis after {:?}", self.connect_timeout),
                        source: None,
                    }),
                }
            })
            .await?;

        Ok(connection.clone())
    }
}

#[async_trait::async_trait]
impl TtlStore for RedisStore {
    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), AppError> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("SET").arg(key).arg(value).arg("EX").arg(ttl_seconds).query_async(&mut conn).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, AppError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        let values: Vec<Option<String>> = redis::cmd("MGET").arg(keys).query_async(&mut conn).await?;
        Ok(values)
    }

    async fn del(&self, keys: &[String]) -> Result<(), AppError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        let _: i64 = redis::cmd("DEL").arg(keys).query_async(&mut conn).await?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, AppError> {
        let mut conn = self.connection().await?;
        let count: i64 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;
        Ok(count)
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<(), AppError> {
        let mut conn = self.connection().await?;
        let _: i64 = redis::cmd("EXPIRE").arg(key).arg(ttl_seconds).query_async(&mut conn).await?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, AppError> {
        let mut conn = self.connection().await?;
        let seconds: i64 = redis::cmd("TTL").arg(key).query_async(&mut conn).await?;
        // -2: missing key, -1: no expiry
        Ok(u64::try_from(seconds).ok())
    }

    async fn write_batch(&self, ops: &[StoreOp]) -> Result<(), AppError> {
        if ops.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for op in ops {
            match op {
                StoreOp::SetEx { key, value, ttl_seconds } => {
                    pipe.cmd("SET").arg(key).arg(value).arg("EX").arg(*ttl_seconds).ignore();
                }
                StoreOp::Del { key } => {
                    pipe.cmd("DEL").arg(key).ignore();
                }
            }
        }

        let mut conn = self.connection().await?;
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn incr_with_expiry(&self, key: &str, ttl_seconds: u64) -> Result<i64, AppError> {
        let mut conn = self.connection().await?;
        let count: i64 = self.incr_with_expiry_script.key(key).arg(ttl_seconds).invoke_async(&mut conn).await?;
        Ok(count)
    }

    async fn incr_if_exists(&self, guard: &str, key: &str, ttl_seconds: u64) -> Result<Option<i64>, AppError> {
        let mut conn = self.connection().await?;
        let count: Option<i64> = self
            .incr_if_exists_script
            .key(guard)
            .key(key)
            .arg(ttl_seconds)
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn ping(&self) -> Result<(), AppError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    #[test]
    fn invalid_url_is_a_store_error() {
        let result = RedisStore::open("not-a-redis-url", Duration::from_secs(1));
        assert!(matches!(result, Err(AppError::Store { .. })));
    }

    #[tokio::test]
    async fn unreachable_server_fails_calls_instead_of_opening() {
        let store = RedisStore::open("redis://127.0.0.1:1", Duration::from_millis(500)).expect("url is valid");

        let started = std::time::Instant::now();
        assert!(matches!(store.ping().await, Err(AppError::Store { .. })));
        assert!(matches!(store.get("otp:09123456789:code").await, Err(AppError::Store { .. })));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    #[ignore = "requires redis"]
    async fn incr_with_expiry_sets_ttl_on_first_hit() {
        let store = RedisStore::open(&local_url(), Duration::from_secs(2)).expect("url is valid");
        let key = format!("rl:test:{}", uuid::Uuid::new_v4());

        assert_eq!(store.incr_with_expiry(&key, 60).await.unwrap(), 1);
        assert_eq!(store.incr_with_expiry(&key, 60).await.unwrap(), 2);
        let ttl = store.ttl(&key).await.unwrap().expect("ttl set");
        assert!(ttl <= 60 && ttl > 0);

        store.del(&[key]).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires redis"]
    async fn incr_if_exists_skips_missing_guard() {
        let store = RedisStore::open(&local_url(), Duration::from_secs(2)).expect("url is valid");
        let guard = format!("otp:{}:code", uuid::Uuid::new_v4());
        let counter = format!("{}:attempts", guard);

        assert_eq!(store.incr_if_exists(&guard, &counter, 60).await.unwrap(), None);
        assert_eq!(store.get(&counter).await.unwrap(), None);

        store.set_ex(&guard, "1234", 60).await.unwrap();
        assert_eq!(store.incr_if_exists(&guard, &counter, 60).await.unwrap(), Some(1));

        store.del(&[guard, counter]).await.unwrap();
    }
}
