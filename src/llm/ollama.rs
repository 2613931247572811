//! Ollama provider implementation (`/api/chat`)
//!
//! Non-streaming replies are a single JSON object. Streaming replies are
//! newline-delimited JSON objects of the same shape, the last one carrying
//! `"done": true`.

use super::types::{LlmMessage, LlmRequest, LlmResponse, TextStream, Usage};
use super::{LlmError, LlmService};
use crate::config::LlmConfig;
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Ollama chat service
pub struct OllamaService {
    client: Client,
    chat_url: String,
    model: String,
}

impl OllamaService {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        if !is_local_url(&config.host) {
            tracing::warn!(
                host = %config.host,
                "OLLAMA_HOST points to a non-local address; images will leave this machine"
            );
        }

        Ok(Self {
            client,
            chat_url: format!("{}/api/chat", config.host.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }

    fn translate_request(&self, request: &LlmRequest, stream: bool) -> OllamaChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);

        if let Some(system) = &request.system {
            messages.push(OllamaMessage {
                role: "system",
                content: system.clone(),
                images: Vec::new(),
            });
        }

        messages.extend(request.messages.iter().map(Self::translate_message));

        OllamaChatRequest {
            model: self.model.clone(),
            messages,
            stream,
        }
    }

    fn translate_message(msg: &LlmMessage) -> OllamaMessage {
        OllamaMessage {
            role: msg.role.as_str(),
            content: msg.content.clone(),
            images: msg.images.clone(),
        }
    }

    async fn post(&self, body: &OllamaChatRequest) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(&self.chat_url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {e}"))
                } else {
                    LlmError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        Err(classify_error(status, &body))
    }
}

#[async_trait]
impl LlmService for OllamaService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let body = self.translate_request(request, false);
        let response = self.post(&body).await?;

        let text = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        let reply: OllamaChatResponse = serde_json::from_str(&text)
            .map_err(|e| LlmError::decode(format!("Failed to parse response: {e} - body: {text}")))?;

        if let Some(error) = reply.error {
            return Err(LlmError::server_error(error));
        }

        let message = reply
            .message
            .ok_or_else(|| LlmError::decode(format!("Response has no message - body: {text}")))?;

        Ok(LlmResponse {
            text: message.content,
            usage: Usage {
                input_tokens: reply.prompt_eval_count.unwrap_or(0),
                output_tokens: reply.eval_count.unwrap_or(0),
            },
        })
    }

    async fn complete_stream(&self, request: &LlmRequest) -> Result<TextStream, LlmError> {
        let body = self.translate_request(request, true);
        let response = self.post(&body).await?;
        Ok(Box::pin(ndjson_text_stream(response.bytes_stream())))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

fn classify_error(status: reqwest::StatusCode, body: &str) -> LlmError {
    // Ollama wraps failures as {"error": "..."}; fall back to the raw body
    let message = serde_json::from_str::<OllamaErrorBody>(body)
        .map_or_else(|_| body.to_string(), |parsed| parsed.error);

    match status.as_u16() {
        400 => LlmError::invalid_request(format!("Invalid request: {message}")),
        404 => LlmError::not_found(format!("Model not found: {message}")),
        500..=599 => LlmError::server_error(format!("Server error: {message}")),
        _ => LlmError::unknown(format!("HTTP {status}: {message}")),
    }
}

/// Check if a URL points to a loopback address. Anything that does not
/// parse to a host counts as remote.
fn is_local_url(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => match parsed.host() {
            Some(url::Host::Domain(d)) => d == "localhost",
            Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
            Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
            None => false,
        },
        Err(_) => false,
    }
}

// ============================================================================
// NDJSON stream decoding
// ============================================================================

struct NdjsonState<S> {
    inner: std::pin::Pin<Box<S>>,
    buffer: Vec<u8>,
    finished: bool,
}

impl<S> NdjsonState<S> {
    fn next_line(&mut self) -> Option<Vec<u8>> {
        let end = self.buffer.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buffer.drain(..=end).collect();
        line.pop();
        Some(line)
    }
}

/// One decoded chunk of a streamed reply
#[derive(Debug, PartialEq, Eq)]
struct StreamChunk {
    text: String,
    done: bool,
}

/// Decode a byte stream of NDJSON chat chunks into text fragments.
///
/// Lines may be split across (or share) network reads. Decoding stops after
/// the chunk marked `done`, after the first error, or when the input ends.
pub(super) fn ndjson_text_stream<S, B, E>(inner: S) -> impl Stream<Item = Result<String, LlmError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = NdjsonState {
        inner: Box::pin(inner),
        buffer: Vec::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }

            if let Some(line) = state.next_line() {
                match decode_chunk(&line) {
                    Ok(None) => continue,
                    Ok(Some(chunk)) => {
                        state.finished = chunk.done;
                        return Some((Ok(chunk.text), state));
                    }
                    Err(e) => {
                        state.finished = true;
                        return Some((Err(e), state));
                    }
                }
            }

            match state.inner.next().await {
                Some(Ok(bytes)) => state.buffer.extend_from_slice(bytes.as_ref()),
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(LlmError::network(format!("Stream interrupted: {e}"))), state));
                }
                None => {
                    // A final line without trailing newline is still a chunk
                    state.finished = true;
                    let rest = std::mem::take(&mut state.buffer);
                    return match decode_chunk(&rest) {
                        Ok(None) => None,
                        Ok(Some(chunk)) => Some((Ok(chunk.text), state)),
                        Err(e) => Some((Err(e), state)),
                    };
                }
            }
        }
    })
}

fn decode_chunk(line: &[u8]) -> Result<Option<StreamChunk>, LlmError> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return Ok(None);
    }

    let chunk: OllamaChatResponse = serde_json::from_slice(line).map_err(|e| {
        LlmError::decode(format!(
            "Failed to parse stream chunk: {e} - line: {}",
            String::from_utf8_lossy(line)
        ))
    })?;

    if let Some(error) = chunk.error {
        return Err(LlmError::server_error(error));
    }

    Ok(Some(StreamChunk {
        text: chunk.message.map(|m| m.content).unwrap_or_default(),
        done: chunk.done,
    }))
}

// Ollama API types

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    message: Option<OllamaResponseMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorBody {
    error: String,
}
