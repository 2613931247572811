//! LLM provider abstraction
//!
//! Provides a common interface over the inference server so the gateway
//! can be exercised against a stub in tests.

mod error;
mod ollama;
#[cfg(test)]
mod proptests;
#[cfg(test)]
pub mod testing;
mod types;

pub use error::{LlmError, LlmErrorKind};
pub use ollama::OllamaService;
pub use types::*;

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

/// Common interface for LLM providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Make a single-shot completion request
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Make a streaming completion request.
    ///
    /// Errors that happen before the first byte arrives are returned
    /// directly; later ones surface as `Err` items of the stream.
    async fn complete_stream(&self, request: &LlmRequest) -> Result<TextStream, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Logging wrapper for LLM services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "LLM request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    kind = e.kind.as_str(),
                    "LLM request failed"
                );
            }
        }

        result
    }

    async fn complete_stream(&self, request: &LlmRequest) -> Result<TextStream, LlmError> {
        let start = std::time::Instant::now();
        let stream = match self.inner.complete_stream(request).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %start.elapsed().as_millis(),
                    error = %e.message,
                    kind = e.kind.as_str(),
                    "LLM stream failed to open"
                );
                return Err(e);
            }
        };

        tracing::debug!(
            model = %self.model_id,
            duration_ms = %start.elapsed().as_millis(),
            "LLM stream opened"
        );

        let model_id = self.model_id.clone();
        Ok(Box::pin(stream.inspect(move |item| {
            if let Err(e) = item {
                tracing::error!(
                    model = %model_id,
                    error = %e.message,
                    kind = e.kind.as_str(),
                    "LLM stream failed"
                );
            }
        })))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
