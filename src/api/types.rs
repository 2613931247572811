//! API request and response types

use crate::session::{ChatTurn, Session};
use serde::{Deserialize, Serialize};

/// Sidebar text shown next to the page
pub const ABOUT_TEXT: &str = "This is an AI-powered interface for interacting with a language model.";

/// Request to update the pending query text
#[derive(Debug, Deserialize)]
pub struct PendingInputRequest {
    pub text: String,
}

/// What the page needs to render a session
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub pending_input: String,
    pub transcript: Vec<ChatTurn>,
    pub about: &'static str,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            pending_input: session.pending_input().to_string(),
            transcript: session.transcript().to_vec(),
            about: ABOUT_TEXT,
        }
    }
}

/// Result of one submit
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// A text question was answered and appended to the transcript
    Answer { turn: ChatTurn },
    /// An image was diagnosed
    Diagnosis { text: String, is_error: bool },
    /// Nothing was sent to the model
    Warning { message: String },
}

/// Response for submit action
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub outcome: SubmitOutcome,
    pub session: SessionView,
}

/// Response for session teardown
#[derive(Debug, Serialize)]
pub struct EndSessionResponse {
    pub ended: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
