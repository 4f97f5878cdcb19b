//! Redis cache backend.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use super::{Cache, CacheError};

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Backend(err.to_string())
    }
}

/// [`Cache`] backed by a Redis server.
///
/// Connections are multiplexed through a [`ConnectionManager`], which
/// reconnects on transport failure. TTLs are written with millisecond
/// precision (`PX`); a zero expiration writes without expiry.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect to the given Redis URL.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(CacheError::from)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Wrap an existing connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn set_cmd(key: &str, value: &str, expiration: Duration) -> redis::Cmd {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if !expiration.is_zero() {
            cmd.arg("PX").arg(expiration.as_millis().max(1) as u64);
        }
        cmd
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn incr_by(&self, key: &str, value: i64) -> Result<i64, CacheError> {
        let mut conn = self.conn.clone();
        let total: i64 = redis::cmd("INCRBY")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(total)
    }

    async fn decr_by(&self, key: &str, decrement: i64) -> Result<i64, CacheError> {
        let mut conn = self.conn.clone();
        let total: i64 = redis::cmd("DECRBY")
            .arg(key)
            .arg(decrement)
            .query_async(&mut conn)
            .await?;
        Ok(total)
    }

    async fn set(&self, key: &str, value: &str, expiration: Duration) -> Result<String, CacheError> {
        let mut conn = self.conn.clone();
        let status: String = Self::set_cmd(key, value, expiration)
            .query_async(&mut conn)
            .await?;
        Ok(status)
    }

    async fn get(&self, key: &str) -> Result<String, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        value.ok_or(CacheError::NotFound)
    }

    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        expiration: Duration,
    ) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let mut cmd = Self::set_cmd(key, value, expiration);
        cmd.arg("NX");
        let created: bool = cmd.query_async(&mut conn).await?;
        Ok(created)
    }

    async fn exists(&self, keys: &[&str]) -> Result<i64, CacheError> {
        let mut conn = self.conn.clone();
        let count: i64 = redis::cmd("EXISTS")
            .arg(keys)
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn del(&self, keys: &[&str]) -> Result<i64, CacheError> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL").arg(keys).query_async(&mut conn).await?;
        Ok(removed)
    }
}
