//! Key-value cache over Redis.
//!
//! Values are stored as JSON so any serializable type can be cached. All
//! operations carry a bounded response timeout so a slow Redis fails closed
//! instead of hanging request handlers.

use std::time::Duration;

use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use serde::{de::DeserializeOwned, Serialize};

use crate::config::CacheConfig;
use crate::error::{AppError, Result};

/// Bounded wait for any single cache operation.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(4);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared cache handle. Cloning is cheap; the underlying connection is
/// multiplexed and reconnects on its own.
#[derive(Clone)]
pub struct Cache {
    conn: ConnectionManager,
}

fn map_err(e: redis::RedisError) -> AppError {
    AppError::Cache(e.to_string())
}

impl Cache {
    /// Connect to Redis and verify the connection with a ping.
    pub async fn connect(cfg: &CacheConfig) -> Result<Self> {
        let url = if cfg.password.is_empty() {
            format!("redis://{}/0", cfg.addr)
        } else {
            format!("redis://:{}@{}/0", cfg.password, cfg.addr)
        };

        let client = redis::Client::open(url).map_err(map_err)?;
        let config = ConnectionManagerConfig::new()
            .set_connection_timeout(CONNECT_TIMEOUT)
            .set_response_timeout(RESPONSE_TIMEOUT);

        let conn = ConnectionManager::new_with_config(client, config)
            .await
            .map_err(map_err)?;

        let cache = Self { conn };
        cache.ping().await?;
        Ok(cache)
    }

    /// Round-trip a PING to verify the connection is alive.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    /// Store any serializable value as JSON with a TTL.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let data = serde_json::to_vec(value)?;
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(data)
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    /// Fetch a JSON value. Returns `None` on a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.conn.clone();
        let data: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;

        match data {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Atomic set-if-absent with a TTL. Returns true when the key was set,
    /// false when it already existed. This is the only cross-request lock in
    /// the system (idempotency).
    pub async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let outcome: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(outcome.is_some())
    }

    /// Delete a key. Missing keys are not an error.
    pub async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(())
    }
}
