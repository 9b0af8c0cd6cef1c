//! Optional answer cache keyed by the exact query text.
//!
//! Entries live under `response_cache:{query}` and expire after the
//! configured TTL. The key ignores session, history, and corpus version, so
//! a hit may return an answer produced for a different conversation.

use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;
use crate::store::{KvStore, StoreError};

pub const CACHE_KEY_PREFIX: &str = "response_cache:";

pub fn cache_key(query: &str) -> String {
    format!("{}{}", CACHE_KEY_PREFIX, query)
}

pub struct ResponseCache {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn KvStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            ttl: Duration::from_secs(config.ttl_secs),
        }
    }

    /// `None` when caching is disabled.
    pub fn from_config(store: Arc<dyn KvStore>, config: &CacheConfig) -> Option<Self> {
        config.enabled.then(|| Self::new(store, config))
    }

    pub async fn get(&self, query: &str) -> Result<Option<String>, StoreError> {
        self.store.get(&cache_key(query)).await
    }

    pub async fn put(&self, query: &str, answer: &str) -> Result<(), StoreError> {
        self.store
            .set_with_expiry(&cache_key(query), answer, self.ttl)
            .await
    }
}
