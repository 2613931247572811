//! Stub LLM service for tests
//!
//! Returns queued replies in order and records every request it receives.

use super::{LlmError, LlmRequest, LlmResponse, LlmService, TextStream};
use async_trait::async_trait;
use futures::stream;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A scripted streaming reply: either the stream fails to open, or it
/// yields the given items in order.
type StreamScript = Result<Vec<Result<String, LlmError>>, LlmError>;

/// Mock LLM service that returns queued responses
pub struct MockLlmService {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    streams: Mutex<VecDeque<StreamScript>>,
    model_id: String,
    /// Record of all requests made
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmService {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            streams: Mutex::new(VecDeque::new()),
            model_id: model_id.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful single-shot response
    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queue a single-shot response with the given text
    pub fn queue_text(&self, text: impl Into<String>) {
        self.queue_response(LlmResponse {
            text: text.into(),
            ..LlmResponse::default()
        });
    }

    /// Queue an error for the next single-shot request
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Queue the items of the next streaming reply
    pub fn queue_stream(&self, items: Vec<Result<String, LlmError>>) {
        self.streams.lock().unwrap().push_back(Ok(items));
    }

    /// Queue a streaming reply made of the given fragments
    pub fn queue_fragments(&self, fragments: &[&str]) {
        self.queue_stream(fragments.iter().map(|f| Ok((*f).to_string())).collect());
    }

    /// Make the next streaming request fail before any chunk arrives
    pub fn queue_stream_error(&self, error: LlmError) {
        self.streams.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for MockLlmService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    async fn complete_stream(&self, request: &LlmRequest) -> Result<TextStream, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock stream queued")));
        let items = script?;
        Ok(Box::pin(stream::iter(items)))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
