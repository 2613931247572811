//! Inference gateway
//!
//! Wraps the configured model behind two fixed call shapes: a single-shot
//! text answer and a streamed image diagnosis. Both steer the model with a
//! fixed system instruction and both normalize every outcome into an
//! [`InferenceResult`]; transport errors never escape this module.

#[cfg(test)]
mod proptests;

use crate::llm::{LlmError, LlmMessage, LlmRequest, LlmService};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Reply the model is instructed to give for anything that is not about X-rays
pub const SENTINEL: &str = "I only know X-rays.";

const TEXT_SYSTEM_PROMPT: &str = "You are an AI assistant specialized in answering questions exclusively about X-ray diagnostics. You will only respond to queries directly related to X-ray interpretation, procedures, or technology. If the query is unrelated to X-rays, respond only with: 'I only know X-rays.' Do not engage with or answer unrelated questions.";

const IMAGE_SYSTEM_PROMPT: &str = "You are an AI diagnostic assistant specialized exclusively in X-ray analysis. Your sole purpose is to analyze uploaded X-ray images and answer questions specifically related to X-ray diagnostics. If an uploaded image is not an X-ray, respond only with: 'I only know X-rays.' Do not provide any additional analysis, information, or engage with non-X-ray images. For any queries or actions unrelated to X-rays, also respond only with: 'I only know X-rays.'";

const DIAGNOSE_INSTRUCTION: &str = "diagnose the image";

const TEXT_ERROR_PREFIX: &str = "Error generating AI response:";
const IMAGE_ERROR_PREFIX: &str = "Error during inference:";

/// Outcome of one gateway call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum InferenceResult {
    Success(String),
    Failure(String),
}

impl InferenceResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Text shown to the user: the reply, or the failure message
    pub fn text(&self) -> &str {
        match self {
            Self::Success(text) | Self::Failure(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Success(text) | Self::Failure(text) => text,
        }
    }
}

/// Image handed to [`InferenceGateway::diagnose_image`]
#[derive(Debug, Clone)]
pub enum ImageRef {
    #[allow(dead_code)] // The page always goes through a scratch file
    Bytes(Vec<u8>),
    /// A readable file holding the image
    Path(PathBuf),
}

impl ImageRef {
    async fn load(self) -> Result<Vec<u8>, LlmError> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Path(path) => tokio::fs::read(&path).await.map_err(|e| {
                LlmError::invalid_request(format!("Cannot read image {}: {e}", path.display()))
            }),
        }
    }
}

/// Builds X-ray requests for one model and normalizes their outcome
pub struct InferenceGateway {
    service: Arc<dyn LlmService>,
}

impl InferenceGateway {
    pub fn new(service: Arc<dyn LlmService>) -> Self {
        Self { service }
    }

    pub fn model_id(&self) -> &str {
        self.service.model_id()
    }

    /// Answer a free-form question. Stateless: no earlier turns are sent.
    pub async fn answer_text(&self, query: &str) -> InferenceResult {
        let request = LlmRequest {
            system: Some(TEXT_SYSTEM_PROMPT.to_string()),
            messages: vec![LlmMessage::user(query)],
        };

        match self.service.complete(&request).await {
            Ok(response) => {
                log_out_of_scope(&response.text);
                InferenceResult::Success(response.text)
            }
            Err(e) => InferenceResult::Failure(format!("{TEXT_ERROR_PREFIX} {e}")),
        }
    }

    /// Diagnose an image. The reply is streamed and fully drained before
    /// returning; partial text is never exposed.
    ///
    /// Whether the image is an X-ray at all is left to the model.
    pub async fn diagnose_image(&self, image: ImageRef) -> InferenceResult {
        match self.try_diagnose(image).await {
            Ok(text) => {
                log_out_of_scope(&text);
                InferenceResult::Success(text)
            }
            Err(e) => InferenceResult::Failure(format!("{IMAGE_ERROR_PREFIX} {e}")),
        }
    }

    async fn try_diagnose(&self, image: ImageRef) -> Result<String, LlmError> {
        let bytes = image.load().await?;
        let request = LlmRequest {
            system: Some(IMAGE_SYSTEM_PROMPT.to_string()),
            messages: vec![LlmMessage::user(DIAGNOSE_INSTRUCTION).with_image(BASE64.encode(&bytes))],
        };

        let stream = self.service.complete_stream(&request).await?;
        drain_fragments(stream).await
    }
}

/// The sentinel is left to the model; we only note when it was produced
fn log_out_of_scope(reply: &str) {
    if reply.trim().trim_matches('\'') == SENTINEL {
        tracing::info!("Model declined an out-of-scope request");
    }
}

/// Concatenate every fragment in arrival order, stopping at the first error
async fn drain_fragments<S>(mut stream: S) -> Result<String, LlmError>
where
    S: Stream<Item = Result<String, LlmError>> + Unpin,
{
    let mut text = String::new();
    while let Some(fragment) = stream.next().await {
        text.push_str(&fragment?);
    }
    Ok(text)
}
