//! Redis-backed [`KvStore`].
//!
//! Holds one multiplexed connection opened at startup; every operation
//! clones the handle, which shares the underlying socket.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::info;

use super::{KvStore, StoreError};

pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connects to `redis_url` (e.g. `redis://127.0.0.1:6379/`).
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| StoreError::Connection(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        info!(url = %redis_url, "connected to redis");
        Ok(Self { conn })
    }
}

fn command_error(e: redis::RedisError) -> StoreError {
    if e.is_connection_dropped() || e.is_connection_refusal() || e.is_io_error() {
        StoreError::Connection(e.to_string())
    } else {
        StoreError::Command(e.to_string())
    }
}

/// Redis list indices for "the last `count` elements".
fn tail_start(count: usize) -> isize {
    -(count.min(isize::MAX as usize) as isize)
}

#[async_trait]
impl KvStore for RedisStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<BTreeMap<String, String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.hgetall(key).await.map_err(command_error)
    }

    async fn hash_replace(
        &self,
        key: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let items: Vec<(&str, &str)> = fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let mut pipe = redis::pipe();
        pipe.atomic().del(key).ignore();
        if !items.is_empty() {
            pipe.hset_multiple(key, &items).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await.map_err(command_error)?;
        Ok(())
    }

    async fn list_tail(&self, key: &str, count: usize) -> Result<Vec<String>, StoreError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        conn.lrange(key, tail_start(count), -1)
            .await
            .map_err(command_error)
    }

    async fn list_push_trim(
        &self,
        key: &str,
        values: &[String],
        keep: usize,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        if !values.is_empty() {
            pipe.rpush(key, values).ignore();
        }
        if keep == 0 {
            pipe.del(key).ignore();
        } else {
            pipe.ltrim(key, tail_start(keep), -1).ignore();
            if let Some(ttl) = ttl {
                pipe.expire(key, ttl.as_secs().max(1) as i64).ignore();
            }
        }
        let _: () = pipe.query_async(&mut conn).await.map_err(command_error)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(command_error)
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(key, value, ttl.as_secs().max(1))
            .await
            .map_err(command_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await.map_err(command_error)?;
        Ok(())
    }
}
