//! Key-value store abstraction.
//!
//! The [`KvStore`] trait covers the handful of operations the fingerprint
//! table, the conversation log, and the response cache need. Compound
//! operations (`hash_replace`, `list_push_trim`) must be atomic per key:
//! the Redis backend runs them as `MULTI`/`EXEC` pipelines, the in-memory
//! backend under a single lock.
//!
//! A store handle is opened once at startup with [`open`] and shared as an
//! `Arc<dyn KvStore>`.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::StoreConfig;

pub use self::memory::InMemoryStore;
pub use self::redis::RedisStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),

    #[error("store command error: {0}")]
    Command(String),
}

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Round-trips to the store; used for startup checks.
    async fn ping(&self) -> Result<(), StoreError>;

    /// All fields of a hash. Missing key → empty map.
    async fn hash_get_all(&self, key: &str) -> Result<BTreeMap<String, String>, StoreError>;

    /// Deletes `key` and writes `fields` in its place, atomically.
    async fn hash_replace(
        &self,
        key: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<(), StoreError>;

    /// The last `count` elements of a list, oldest first.
    async fn list_tail(&self, key: &str, count: usize) -> Result<Vec<String>, StoreError>;

    /// Appends `values`, trims the list to its last `keep` elements, and
    /// optionally refreshes the key's expiry, all atomically.
    async fn list_push_trim(
        &self,
        key: &str,
        values: &[String],
        keep: usize,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Opens the configured backend and checks that it answers.
pub async fn open(config: &StoreConfig) -> Result<Arc<dyn KvStore>, StoreError> {
    let store: Arc<dyn KvStore> = match config.backend.as_str() {
        "memory" => Arc::new(InMemoryStore::new()),
        "redis" => Arc::new(RedisStore::connect(&config.redis_url()).await?),
        other => {
            return Err(StoreError::Connection(format!(
                "unknown store backend: {}",
                other
            )))
        }
    };
    store.ping().await?;
    Ok(store)
}
