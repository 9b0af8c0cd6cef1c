//! In-process [`KvStore`] for tests and single-instance runs.
//!
//! One `Mutex` guards every key, which makes each compound operation atomic.
//! Expiry uses `tokio::time::Instant`, so paused-clock tests can advance
//! past a TTL without sleeping. Reads drop the expired key they touch; every
//! write sweeps all expired keys, so the map stays bounded by live data.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{KvStore, StoreError};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    List(VecDeque<String>),
    Hash(BTreeMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Command("store lock poisoned".to_string()))
    }

    /// Locks the map and removes every expired entry.
    fn lock_for_write(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>, StoreError> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        entries.retain(|_, e| e.is_live(now));
        Ok(entries)
    }
}

/// Drops `key` if it has expired, then returns the live entry, if any.
fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    let now = Instant::now();
    if entries.get(key).is_some_and(|e| !e.is_live(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Command(format!(
        "WRONGTYPE operation against key '{}' holding the wrong kind of value",
        key
    ))
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }

    async fn hash_get_all(&self, key: &str) -> Result<BTreeMap<String, String>, StoreError> {
        let mut entries = self.lock()?;
        match live(&mut entries, key) {
            None => Ok(BTreeMap::new()),
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => Ok(fields.clone()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn hash_replace(
        &self,
        key: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        let mut entries = self.lock_for_write()?;
        entries.remove(key);
        if !fields.is_empty() {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Hash(fields.clone()),
                    expires_at: None,
                },
            );
        }
        Ok(())
    }

    async fn list_tail(&self, key: &str, count: usize) -> Result<Vec<String>, StoreError> {
        let mut entries = self.lock()?;
        match live(&mut entries, key) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::List(items),
                ..
            }) => {
                let skip = items.len().saturating_sub(count);
                Ok(items.iter().skip(skip).cloned().collect())
            }
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn list_push_trim(
        &self,
        key: &str,
        values: &[String],
        keep: usize,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut entries = self.lock_for_write()?;
        if live(&mut entries, key).is_none() {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::List(VecDeque::new()),
                    expires_at: None,
                },
            );
        }
        let entry = entries.get_mut(key).ok_or_else(|| wrong_type(key))?;
        let Value::List(items) = &mut entry.value else {
            return Err(wrong_type(key));
        };

        items.extend(values.iter().cloned());
        while items.len() > keep {
            items.pop_front();
        }
        if items.is_empty() {
            entries.remove(key);
            return Ok(());
        }
        if let Some(ttl) = ttl {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.lock()?;
        match live(&mut entries, key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut entries = self.lock_for_write()?;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.remove(key);
        Ok(())
    }
}
