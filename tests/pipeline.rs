//! End-to-end tests of the indexing and answering pipeline, using the
//! in-memory store and deterministic fakes for the embedder and chat model.

mod common;

use futures::StreamExt;
use std::fs;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{minimal_pdf, KeywordEmbedder, TestEnv, RESUME};
use portfolio_chat::change::{ChangeDetector, FINGERPRINT_KEY};
use portfolio_chat::corpus;
use portfolio_chat::config::Config;
use portfolio_chat::error::ChatError;
use portfolio_chat::fingerprint::fingerprint;
use portfolio_chat::models::Exchange;
use portfolio_chat::orchestrator::QueryOrchestrator;
use portfolio_chat::store::InMemoryStore;

#[tokio::test]
async fn first_query_builds_index_and_records_history() {
    let env = TestEnv::with_resume();
    assert!(!env.config.index.path.exists());

    let orchestrator = env.orchestrator().await;
    assert!(env.config.index.path.is_file());

    let table = env.store.hash_get_all(FINGERPRINT_KEY).await.unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table["resume.txt"], fingerprint(RESUME.as_bytes()));

    let answer = orchestrator
        .answer("s1", "What is your experience?")
        .await
        .unwrap();
    assert_eq!(answer, "I have seven years of experience in payments.");

    let prompts = env.chat.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].history.is_empty());
    assert_eq!(prompts[0].affiliation, "s1");
    assert!(prompts[0]
        .context
        .iter()
        .any(|c| c.contains("Seven years of experience")));

    assert_eq!(
        orchestrator.history("s1").await.unwrap(),
        vec![Exchange::new("What is your experience?", answer)]
    );
}

#[tokio::test]
async fn second_query_sees_the_first_exchange() {
    let env = TestEnv::with_resume();
    let orchestrator = env.orchestrator().await;

    let first = orchestrator
        .answer("s1", "What is your experience?")
        .await
        .unwrap();
    orchestrator
        .answer("s1", "Which languages do you use?")
        .await
        .unwrap();

    let prompts = env.chat.prompts();
    assert_eq!(
        prompts[1].history,
        vec![Exchange::new("What is your experience?", first)]
    );
}

#[tokio::test]
async fn history_keeps_the_last_three_exchanges() {
    let env = TestEnv::with_resume();
    let orchestrator = env.orchestrator().await;

    for i in 1..=5 {
        orchestrator
            .answer("s1", &format!("question {}", i))
            .await
            .unwrap();
    }

    let history = orchestrator.history("s1").await.unwrap();
    let questions: Vec<&str> = history.iter().map(|e| e.question.as_str()).collect();
    assert_eq!(questions, vec!["question 3", "question 4", "question 5"]);

    // the fifth call saw at most three prior exchanges
    assert_eq!(env.chat.prompts()[4].history.len(), 3);
}

#[tokio::test]
async fn sessions_do_not_share_history() {
    let env = TestEnv::with_resume();
    let orchestrator = env.orchestrator().await;

    orchestrator.answer("alice", "hello").await.unwrap();
    orchestrator.answer("bob", "hello").await.unwrap();

    assert!(env.chat.prompts()[1].history.is_empty());
    assert_eq!(orchestrator.history("alice").await.unwrap().len(), 1);
    assert_eq!(orchestrator.history("bob").await.unwrap().len(), 1);
}

#[tokio::test]
async fn restart_with_unchanged_documents_loads_the_index() {
    let env = TestEnv::with_resume();
    let first = env.orchestrator().await;
    let built_at = first.status().await.unwrap().index.unwrap().built_at;
    drop(first);

    let second = env.orchestrator().await;
    let status = second.status().await.unwrap();
    assert!(status.up_to_date);
    assert_eq!(status.index.unwrap().built_at, built_at);
}

#[tokio::test]
async fn pdf_files_are_discovered_and_fingerprinted() {
    let tmp = tempfile::TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    let pdf = minimal_pdf("Jane Doe resume");
    fs::write(docs.join("resume.pdf"), &pdf).unwrap();
    fs::write(docs.join("notes.txt"), "not part of the corpus").unwrap();
    let config: Config = common::config_for(tmp.path(), "**/*.pdf");

    let files = corpus::list_files(&config.corpus).unwrap();
    let relative: Vec<&str> = files.iter().map(|f| f.relative.as_str()).collect();
    assert_eq!(relative, vec!["resume.pdf"]);

    let detector = ChangeDetector::new(
        Arc::new(InMemoryStore::new()),
        config.corpus.clone(),
        config.chunking.clone(),
    );
    let table = detector.current_fingerprints(&files).unwrap();
    assert_eq!(table["resume.pdf"], fingerprint(&pdf));
    assert!(detector.stored_fingerprints().await.unwrap().is_empty());
}

#[tokio::test]
async fn pdf_resume_is_indexed_and_answered_on_first_query() {
    let env = TestEnv::with_pdf_resume("Seven years of Rust experience");
    assert!(!env.config.index.path.exists());

    let orchestrator = env.orchestrator().await;
    assert!(env.config.index.path.is_file());
    let table = env.store.hash_get_all(FINGERPRINT_KEY).await.unwrap();
    assert_eq!(table.keys().collect::<Vec<_>>(), vec!["resume.pdf"]);

    let answer = orchestrator
        .answer("s1", "What is your experience?")
        .await
        .unwrap();
    assert_eq!(answer, "I have seven years of experience in payments.");

    let prompts = env.chat.prompts();
    assert!(prompts[0]
        .context
        .iter()
        .any(|c| c.contains("Seven years of Rust experience")));
    assert_eq!(
        orchestrator.history("s1").await.unwrap(),
        vec![Exchange::new("What is your experience?", answer)]
    );
}

#[tokio::test]
async fn empty_corpus_is_fatal() {
    let env = TestEnv::with_resume();
    fs::remove_file(env.docs().join("resume.txt")).unwrap();

    let err = match QueryOrchestrator::bootstrap(
        &env.config,
        env.store.clone(),
        Arc::new(KeywordEmbedder),
        env.chat.clone(),
    )
    .await
    {
        Err(e) => e,
        Ok(_) => panic!("bootstrap must fail without documents"),
    };
    assert!(matches!(err, ChatError::NoDocuments(_)));
    assert!(err.is_fatal());
    assert!(!env.config.index.path.exists());
}

#[tokio::test]
async fn stream_concatenates_to_the_answer_and_records_on_completion() {
    let env = TestEnv::with_resume();
    let orchestrator = env.orchestrator().await;

    let mut fragments = orchestrator
        .answer_stream("s1", "What is your experience?")
        .await
        .unwrap();
    let mut text = String::new();
    let mut count = 0;
    while let Some(fragment) = fragments.next().await {
        text.push_str(&fragment.unwrap());
        count += 1;
    }

    assert!(count > 1);
    assert_eq!(text, "I have seven years of experience in payments.");
    assert_eq!(
        orchestrator.history("s1").await.unwrap(),
        vec![Exchange::new("What is your experience?", text)]
    );
}

#[tokio::test]
async fn dropped_stream_records_nothing() {
    let env = TestEnv::with_resume();
    let orchestrator = env.orchestrator().await;

    let mut fragments = orchestrator
        .answer_stream("s1", "What is your experience?")
        .await
        .unwrap();
    assert_eq!(fragments.next().await.unwrap().unwrap(), "I ");
    drop(fragments);

    assert!(orchestrator.history("s1").await.unwrap().is_empty());
}

#[tokio::test]
async fn cache_hit_skips_the_model_and_history() {
    let mut env = TestEnv::with_resume();
    env.config.cache.enabled = true;
    let orchestrator = env.orchestrator().await;

    let first = orchestrator.answer("s1", "What is your stack?").await.unwrap();
    let second = orchestrator.answer("s2", "What is your stack?").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(env.chat.calls(), 1);
    assert!(orchestrator.history("s2").await.unwrap().is_empty());
    assert_eq!(
        env.store
            .get("response_cache:What is your stack?")
            .await
            .unwrap()
            .as_deref(),
        Some(first.as_str())
    );
}

#[tokio::test]
async fn cache_disabled_calls_the_model_every_time() {
    let env = TestEnv::with_resume();
    let orchestrator = env.orchestrator().await;

    orchestrator.answer("s1", "What is your stack?").await.unwrap();
    orchestrator.answer("s1", "What is your stack?").await.unwrap();
    assert_eq!(env.chat.calls(), 2);
}

#[tokio::test]
async fn reindex_swaps_in_new_documents() {
    let env = TestEnv::with_resume();
    let orchestrator = env.orchestrator().await;
    assert!(!orchestrator.reindex().await.unwrap());

    fs::write(
        env.docs().join("projects.txt"),
        "Ran Kubernetes clusters for the payments team.",
    )
    .unwrap();
    assert!(orchestrator.reindex().await.unwrap());
    assert!(!orchestrator.reindex().await.unwrap());

    orchestrator
        .answer("s1", "Have you used Kubernetes?")
        .await
        .unwrap();
    let prompt = env.chat.prompts().pop().unwrap();
    assert!(prompt.context[0].contains("Kubernetes clusters"));
}

#[tokio::test]
async fn model_failure_is_a_processing_error_and_records_nothing() {
    let env = TestEnv::with_resume();
    let orchestrator = env.orchestrator().await;
    env.chat.fail.store(true, Ordering::SeqCst);

    let err = orchestrator
        .answer("s1", "What is your experience?")
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Processing(_)));
    assert!(orchestrator.history("s1").await.unwrap().is_empty());

    let err = match orchestrator.answer_stream("s1", "What is your experience?").await {
        Err(e) => e,
        Ok(_) => panic!("stream must fail when the model is down"),
    };
    assert!(matches!(err, ChatError::Processing(_)));
}

#[tokio::test]
async fn empty_query_is_rejected_before_any_work() {
    let env = TestEnv::with_resume();
    let orchestrator = env.orchestrator().await;

    let err = orchestrator.answer("s1", "  ").await.unwrap_err();
    assert!(matches!(err, ChatError::BadRequest(_)));
    assert_eq!(env.chat.calls(), 0);
}
