//! Query orchestration: cache, history, retrieval, prompt, LLM, record.
//!
//! # Answer flow
//!
//! 1. Exact-query cache lookup, when the cache is enabled. A hit returns
//!    immediately and leaves the session history untouched.
//! 2. Recent history for the session.
//! 3. Query embedding and top-k retrieval against the current index snapshot.
//! 4. Prompt assembly (see [`crate::prompt`]).
//! 5. LLM call.
//! 6. History append, then cache write.
//!
//! Failures in steps 2 to 6 surface as [`ChatError::Processing`]; nothing is
//! recorded for a failed request. The streaming variant records only after
//! the last fragment, so a client that disconnects mid-answer leaves no trace.

use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::ResponseCache;
use crate::config::{Config, RetrievalConfig};
use crate::conversation::ConversationStore;
use crate::embedding::Embedder;
use crate::error::{ChatError, Result};
use crate::index::IndexHandle;
use crate::indexer::{IndexStatus, Indexer};
use crate::llm::{ChatModel, TextStream};
use crate::models::Exchange;
use crate::prompt::Prompt;
use crate::store::KvStore;

pub struct QueryOrchestrator {
    retrieval: RetrievalConfig,
    indexer: Indexer,
    index: IndexHandle,
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatModel>,
    recorder: Recorder,
}

/// Persists a finished exchange. Cloned into streaming responses, which
/// outlive the borrow of the orchestrator.
#[derive(Clone)]
struct Recorder {
    conversations: Arc<ConversationStore>,
    cache: Option<Arc<ResponseCache>>,
}

impl Recorder {
    async fn record(&self, session_id: &str, query: &str, answer: &str) -> Result<()> {
        self.conversations
            .append(session_id, query, answer)
            .await
            .map_err(|e| ChatError::from(e).into_processing())?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(query, answer).await {
                warn!(error = %e, "failed to cache response");
            }
        }
        Ok(())
    }
}

impl QueryOrchestrator {
    /// Prepares the index and wires up the request path.
    ///
    /// Fails with a fatal error ([`ChatError::is_fatal`]) when the corpus is
    /// empty; the server must not start without an index.
    pub async fn bootstrap(
        config: &Config,
        store: Arc<dyn KvStore>,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
    ) -> Result<Self> {
        let indexer = Indexer::new(config, store.clone(), embedder.clone());
        let index = indexer.bootstrap().await?;
        info!(chunks = index.len(), chat_model = chat.model_name(), "index ready");

        let conversations = Arc::new(ConversationStore::new(store.clone(), &config.history));
        let cache = ResponseCache::from_config(store, &config.cache).map(Arc::new);

        Ok(Self {
            retrieval: config.retrieval.clone(),
            indexer,
            index: IndexHandle::new(index),
            embedder,
            chat,
            recorder: Recorder {
                conversations,
                cache,
            },
        })
    }

    pub async fn answer(&self, session_id: &str, query: &str) -> Result<String> {
        validate_request(session_id, query)?;

        if let Some(cached) = self.cached(query).await {
            return Ok(cached);
        }

        let prompt = self
            .prepare(session_id, query)
            .await
            .map_err(ChatError::into_processing)?;
        let answer = self
            .chat
            .complete(&prompt)
            .await
            .map_err(|e| ChatError::Llm(e.to_string()).into_processing())?;

        self.recorder.record(session_id, query, &answer).await?;
        debug!(session_id, chars = answer.len(), "answered");
        Ok(answer)
    }

    /// Like [`answer`](Self::answer), but yields the LLM output as it
    /// arrives. Concatenating the fragments gives the full answer.
    pub async fn answer_stream(&self, session_id: &str, query: &str) -> Result<TextStream> {
        validate_request(session_id, query)?;

        if let Some(cached) = self.cached(query).await {
            return Ok(Box::pin(futures::stream::once(async move {
                Ok::<_, anyhow::Error>(cached)
            })));
        }

        let prompt = self
            .prepare(session_id, query)
            .await
            .map_err(ChatError::into_processing)?;
        let mut upstream = self
            .chat
            .stream(&prompt)
            .await
            .map_err(|e| ChatError::Llm(e.to_string()).into_processing())?;

        let recorder = self.recorder.clone();
        let session_id = session_id.to_string();
        let query = query.to_string();

        let stream = async_stream::stream! {
            let mut answer = String::new();
            let mut failed = false;
            while let Some(fragment) = upstream.next().await {
                match fragment {
                    Ok(text) => {
                        answer.push_str(&text);
                        yield Ok(text);
                    }
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "answer stream failed");
                        failed = true;
                        yield Err(e);
                        break;
                    }
                }
            }
            if !failed {
                if let Err(e) = recorder.record(&session_id, &query, &answer).await {
                    yield Err(anyhow::Error::from(e));
                }
            }
        };

        Ok(Box::pin(stream))
    }

    /// Rebuilds and swaps in a new index if the corpus changed. Returns
    /// whether a rebuild happened. Concurrent calls run one at a time;
    /// queries keep using the previous index until the swap.
    pub async fn reindex(&self) -> Result<bool> {
        let _guard = self.index.rebuild_guard().await;
        match self.indexer.refresh().await? {
            Some(index) => {
                info!(chunks = index.len(), "swapping in rebuilt index");
                self.index.replace(index).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn history(&self, session_id: &str) -> Result<Vec<Exchange>> {
        Ok(self.recorder.conversations.recent(session_id).await?)
    }

    /// Name of the model answering questions.
    pub fn chat_model(&self) -> &str {
        self.chat.model_name()
    }

    pub async fn status(&self) -> Result<IndexStatus> {
        self.indexer.status().await
    }

    async fn cached(&self, query: &str) -> Option<String> {
        let cache = self.recorder.cache.as_ref()?;
        match cache.get(query).await {
            Ok(Some(answer)) => {
                debug!("response cache hit");
                Some(answer)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "response cache lookup failed");
                None
            }
        }
    }

    async fn prepare(&self, session_id: &str, query: &str) -> Result<Prompt> {
        let history = self.recorder.conversations.recent(session_id).await?;

        let query_vec = self
            .embedder
            .embed_query(query)
            .await
            .map_err(|e| ChatError::Embedding(e.to_string()))?;

        let index = self.index.snapshot().await;
        let hits = index.search(&query_vec, self.retrieval.k, self.retrieval.search_breadth);
        debug!(
            session_id,
            history = history.len(),
            hits = hits.len(),
            "retrieved context"
        );

        Ok(Prompt::new(
            hits.into_iter().map(|h| h.text).collect(),
            history,
            query,
            session_id,
        ))
    }
}

fn validate_request(session_id: &str, query: &str) -> Result<()> {
    if session_id.trim().is_empty() {
        return Err(ChatError::BadRequest(
            "session_id must not be empty".to_string(),
        ));
    }
    if query.trim().is_empty() {
        return Err(ChatError::BadRequest("query must not be empty".to_string()));
    }
    Ok(())
}
