//! Chat model abstraction and the OpenAI chat-completions client.
//!
//! [`ChatModel::complete`] returns the whole answer; [`ChatModel::stream`]
//! returns a finite stream of text fragments parsed from the provider's
//! server-sent events. Dropping the stream drops the HTTP response, which
//! aborts the upstream request.

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::embedding::send_with_retry;
use crate::prompt::Prompt;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Fragments of an answer, in order. Ends after the last fragment or the
/// first error.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &Prompt) -> Result<String>;

    async fn stream(&self, prompt: &Prompt) -> Result<TextStream>;
}

pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

pub struct OpenAIChat {
    model: String,
    temperature: f32,
    url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_CHAT_URL.to_string()),
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }

    fn request_body(&self, prompt: &Prompt, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": prompt.messages(),
            "stream": stream,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let body = self.request_body(prompt, false);
        let response = send_with_retry(
            &self.client,
            &self.url,
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        let json: serde_json::Value = response.json().await?;
        parse_completion(&json)
    }

    async fn stream(&self, prompt: &Prompt) -> Result<TextStream> {
        let body = self.request_body(prompt, true);
        let response = send_with_retry(
            &self.client,
            &self.url,
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;

        Ok(decode_event_stream(response.bytes_stream()))
    }
}

/// Turns a chat-completions SSE body into answer fragments.
///
/// The body must end with `data: [DONE]`; a body that closes without it
/// yields an error, so a truncated answer is never mistaken for a full one.
fn decode_event_stream<S, B, E>(body: S) -> TextStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let stream = async_stream::stream! {
        let mut body = Box::pin(body);
        let mut decoder = SseDecoder::default();
        let mut done = false;
        'read: while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(anyhow::Error::from(e));
                    return;
                }
            };
            for data in decoder.push(chunk.as_ref()) {
                match parse_stream_data(&data) {
                    Ok(Some(text)) => {
                        if !text.is_empty() {
                            yield Ok(text);
                        }
                    }
                    Ok(None) => {
                        done = true;
                        break 'read;
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }
        if !done {
            yield Err(anyhow::anyhow!("OpenAI stream ended before [DONE]"));
        }
    };

    Box::pin(stream)
}

fn parse_completion(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

/// Parses one SSE `data:` payload. `Ok(None)` marks the end of the stream.
fn parse_stream_data(data: &str) -> Result<Option<String>> {
    if data == "[DONE]" {
        return Ok(None);
    }
    let json: serde_json::Value = serde_json::from_str(data)?;
    if let Some(err) = json.get("error") {
        bail!("OpenAI stream error: {}", err);
    }
    Ok(Some(
        json.pointer("/choices/0/delta/content")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string(),
    ))
}

/// Splits a byte stream into SSE `data:` payloads.
///
/// Bytes are buffered until a full line arrives, so multi-byte characters
/// split across network chunks decode correctly.
#[derive(Default)]
struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\r', '\n']);
            if let Some(data) = line.strip_prefix("data:") {
                out.push(data.trim_start().to_string());
            }
        }
        out
    }
}
