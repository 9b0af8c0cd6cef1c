//! Shared fixtures for the integration tests: a keyword embedder, a chat
//! model that records its prompts, corpus/config builders, and a minimal PDF.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use portfolio_chat::config::Config;
use portfolio_chat::embedding::Embedder;
use portfolio_chat::llm::{ChatModel, TextStream};
use portfolio_chat::orchestrator::QueryOrchestrator;
use portfolio_chat::prompt::Prompt;
use portfolio_chat::store::{InMemoryStore, KvStore};

const VOCAB: &[&str] = &[
    "rust",
    "python",
    "experience",
    "years",
    "kubernetes",
    "payments",
    "education",
    "team",
];

/// Counts vocabulary words; deterministic and network-free.
pub struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                let mut v: Vec<f32> = VOCAB
                    .iter()
                    .map(|w| lower.matches(w).count() as f32)
                    .collect();
                v.push(0.1);
                v
            })
            .collect())
    }
}

/// Replies with a fixed answer and keeps every prompt it was given.
pub struct RecordingChat {
    reply: String,
    prompts: Mutex<Vec<Prompt>>,
    pub fail: AtomicBool,
}

impl RecordingChat {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        })
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn take(&self, prompt: &Prompt) -> Result<()> {
        self.prompts.lock().unwrap().push(prompt.clone());
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("model unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl ChatModel for RecordingChat {
    fn model_name(&self) -> &str {
        "recording-test"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        self.take(prompt)?;
        Ok(self.reply.clone())
    }

    async fn stream(&self, prompt: &Prompt) -> Result<TextStream> {
        self.take(prompt)?;
        let fragments: Vec<Result<String>> = self
            .reply
            .split_inclusive(' ')
            .map(|s| Ok(s.to_string()))
            .collect();
        Ok(Box::pin(futures::stream::iter(fragments)))
    }
}

pub const RESUME: &str = "Jane Doe, backend engineer.\n\n\
Seven years of experience building payments systems in Rust and Python.\n\n\
Led a team of five engineers.";

/// Config rooted in `root`, with documents under `root/docs` matching
/// `include` and the index at `root/index/index.sqlite`.
pub fn config_for(root: &Path, include: &str) -> Config {
    let toml = format!(
        "[corpus]\ndir = {:?}\ninclude_globs = [{:?}]\n\n[index]\npath = {:?}\n\n[store]\nbackend = \"memory\"\n",
        root.join("docs"),
        include,
        root.join("index").join("index.sqlite"),
    );
    let config: Config = toml::from_str(&toml).unwrap();
    portfolio_chat::config::validate(&config).unwrap();
    config
}

pub struct TestEnv {
    pub tmp: TempDir,
    pub config: Config,
    pub store: Arc<dyn KvStore>,
    pub chat: Arc<RecordingChat>,
}

impl TestEnv {
    /// A text corpus holding `resume.txt`.
    pub fn with_resume() -> Self {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("docs")).unwrap();
        fs::write(tmp.path().join("docs").join("resume.txt"), RESUME).unwrap();
        let config = config_for(tmp.path(), "**/*.txt");
        Self {
            tmp,
            config,
            store: Arc::new(InMemoryStore::new()),
            chat: RecordingChat::new("I have seven years of experience in payments."),
        }
    }

    /// A PDF corpus holding `resume.pdf` whose only page shows `text`.
    pub fn with_pdf_resume(text: &str) -> Self {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("docs")).unwrap();
        fs::write(tmp.path().join("docs").join("resume.pdf"), minimal_pdf(text)).unwrap();
        let config = config_for(tmp.path(), "**/*.pdf");
        Self {
            tmp,
            config,
            store: Arc::new(InMemoryStore::new()),
            chat: RecordingChat::new("I have seven years of experience in payments."),
        }
    }

    pub fn docs(&self) -> std::path::PathBuf {
        self.tmp.path().join("docs")
    }

    pub async fn orchestrator(&self) -> QueryOrchestrator {
        QueryOrchestrator::bootstrap(
            &self.config,
            self.store.clone(),
            Arc::new(KeywordEmbedder),
            self.chat.clone(),
        )
        .await
        .unwrap()
    }
}

/// Minimal single-page PDF showing `text`. Offsets and the content stream
/// length are computed so the xref table is valid.
pub fn minimal_pdf(text: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", text);
    let mut out = Vec::new();
    let mut offsets = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");

    offsets.push(out.len());
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    offsets.push(out.len());
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    offsets.push(out.len());
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    offsets.push(out.len());
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    offsets.push(out.len());
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", offsets.len() + 1).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            offsets.len() + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}
