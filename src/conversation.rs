//! Rolling per-session conversation log.
//!
//! Each session is a list under `chat_history:{session_id}` holding
//! question and answer as separate, alternating entries. Appends push both
//! entries and trim to the cap in one atomic store call, so concurrent
//! requests on the same session never leave the list over capacity.

use std::sync::Arc;
use std::time::Duration;

use crate::config::HistoryConfig;
use crate::models::Exchange;
use crate::store::{KvStore, StoreError};

pub const HISTORY_KEY_PREFIX: &str = "chat_history:";

pub fn history_key(session_id: &str) -> String {
    format!("{}{}", HISTORY_KEY_PREFIX, session_id)
}

pub struct ConversationStore {
    store: Arc<dyn KvStore>,
    max_entries: usize,
    ttl: Option<Duration>,
}

impl ConversationStore {
    pub fn new(store: Arc<dyn KvStore>, config: &HistoryConfig) -> Self {
        Self {
            store,
            max_entries: config.max_pairs * 2,
            ttl: config.ttl_secs.map(Duration::from_secs),
        }
    }

    /// Most recent exchanges, oldest first. A new session yields an empty
    /// list. An unpaired leading entry is skipped.
    pub async fn recent(&self, session_id: &str) -> Result<Vec<Exchange>, StoreError> {
        let entries = self
            .store
            .list_tail(&history_key(session_id), self.max_entries)
            .await?;
        let skip = entries.len() % 2;
        Ok(entries[skip..]
            .chunks_exact(2)
            .map(|pair| Exchange::new(pair[0].clone(), pair[1].clone()))
            .collect())
    }

    pub async fn append(
        &self,
        session_id: &str,
        question: &str,
        answer: &str,
    ) -> Result<(), StoreError> {
        self.store
            .list_push_trim(
                &history_key(session_id),
                &[question.to_string(), answer.to_string()],
                self.max_entries,
                self.ttl,
            )
            .await
    }

    pub async fn clear(&self, session_id: &str) -> Result<(), StoreError> {
        self.store.delete(&history_key(session_id)).await
    }
}
