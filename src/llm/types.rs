//! Common types for LLM interactions

use super::LlmError;
use futures::Stream;
use std::pin::Pin;

/// LLM request
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// System instruction, sent ahead of every other message
    pub system: Option<String>,
    pub messages: Vec<LlmMessage>,
}

/// Message in conversation
#[derive(Debug, Clone)]
pub struct LlmMessage {
    pub role: MessageRole,
    pub content: String,
    /// Base64-encoded images attached to this message
    pub images: Vec<String>,
}

impl LlmMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn with_image(mut self, base64_data: impl Into<String>) -> Self {
        self.images.push(base64_data.into());
        self
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::User => "user",
        }
    }
}

/// LLM response
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub text: String,
    pub usage: Usage,
}

/// Usage statistics as reported by the inference server
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Incremental text fragments of a streamed reply, in arrival order.
///
/// The stream is finite and cannot be restarted; an `Err` item ends it.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;
