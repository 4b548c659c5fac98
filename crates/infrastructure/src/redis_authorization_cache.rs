//! Redis-backed authorization cache.

use async_trait::async_trait;
use gatewarden_application::AuthorizationCache;
use gatewarden_core::{AppError, AppResult};
use redis::AsyncCommands;

/// Redis implementation of the authorization cache port.
///
/// All failures map to `CacheUnavailable`, which callers treat as a miss:
/// the cache is best-effort by contract, never load-bearing.
#[derive(Clone)]
pub struct RedisAuthorizationCache {
    client: redis::Client,
}

impl RedisAuthorizationCache {
    /// Creates a cache adapter with a configured Redis client.
    #[must_use]
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| {
                AppError::CacheUnavailable(format!("failed to connect to redis: {error}"))
            })
    }
}

#[async_trait]
impl AuthorizationCache for RedisAuthorizationCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut connection = self.connection().await?;
        connection.get(key).await.map_err(|error| {
            AppError::CacheUnavailable(format!("failed to read cache entry: {error}"))
        })
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u32) -> AppResult<()> {
        if ttl_seconds == 0 {
            return Ok(());
        }

        let mut connection = self.connection().await?;
        connection
            .set_ex(key, value, u64::from(ttl_seconds))
            .await
            .map_err(|error| {
                AppError::CacheUnavailable(format!("failed to write cache entry: {error}"))
            })
    }

    async fn invalidate(&self, key: &str) -> AppResult<()> {
        let mut connection = self.connection().await?;
        connection.del(key).await.map_err(|error| {
            AppError::CacheUnavailable(format!("failed to invalidate cache entry: {error}"))
        })
    }

    // O(matching keys): a SCAN walk over the keyspace. Call sites prefer
    // exact-key invalidation whenever the affected key is known.
    async fn invalidate_prefix(&self, prefix: &str) -> AppResult<()> {
        let mut connection = self.connection().await?;
        let pattern = format!("{prefix}*");

        let mut cursor: u64 = 0;
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern.as_str())
                .arg("COUNT")
                .arg(100)
                .query_async(&mut connection)
                .await
                .map_err(|error| {
                    AppError::CacheUnavailable(format!("failed to scan cache keys: {error}"))
                })?;

            if !keys.is_empty() {
                let _: i64 = connection.del(keys.as_slice()).await.map_err(|error| {
                    AppError::CacheUnavailable(format!(
                        "failed to invalidate cache entries: {error}"
                    ))
                })?;
            }

            cursor = next_cursor;
            if cursor == 0 {
                return Ok(());
            }
        }
    }

    async fn ping(&self) -> AppResult<()> {
        let mut connection = self.connection().await?;
        let response: String = connection.ping().await.map_err(|error| {
            AppError::CacheUnavailable(format!("redis ping failed: {error}"))
        })?;

        if response.eq_ignore_ascii_case("pong") {
            Ok(())
        } else {
            Err(AppError::CacheUnavailable(format!(
                "unexpected redis ping response: {response}"
            )))
        }
    }
}
