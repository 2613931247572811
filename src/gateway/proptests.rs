//! Property-based tests for streamed diagnosis aggregation

use super::{ImageRef, InferenceGateway, InferenceResult};
use crate::llm::testing::MockLlmService;
use crate::llm::LlmError;
use proptest::prelude::*;
use std::sync::Arc;

fn run<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #[test]
    fn prop_diagnosis_is_ordered_concatenation(
        fragments in prop::collection::vec(".{0,16}", 0..24),
    ) {
        let mock = Arc::new(MockLlmService::new("llava"));
        mock.queue_stream(fragments.iter().cloned().map(Ok).collect());
        let gateway = InferenceGateway::new(mock);

        let result = run(gateway.diagnose_image(ImageRef::Bytes(vec![0xFF, 0xD8])));
        prop_assert_eq!(result, InferenceResult::Success(fragments.concat()));
    }

    #[test]
    fn prop_any_stream_error_is_a_failure(
        before in prop::collection::vec("[a-z ]{0,8}", 0..8),
        message in "[a-zA-Z ]{1,30}",
    ) {
        let mock = Arc::new(MockLlmService::new("llava"));
        let mut items: Vec<Result<String, LlmError>> = before.into_iter().map(Ok).collect();
        items.push(Err(LlmError::network(message.clone())));
        mock.queue_stream(items);
        let gateway = InferenceGateway::new(mock);

        let result = run(gateway.diagnose_image(ImageRef::Bytes(vec![0])));
        prop_assert_eq!(result, InferenceResult::Failure(format!("Error during inference: {message}")));
    }

    #[test]
    fn prop_text_failures_carry_prefix(message in "[a-zA-Z0-9 :]{0,40}") {
        let mock = Arc::new(MockLlmService::new("llava"));
        mock.queue_error(LlmError::server_error(message.clone()));
        let gateway = InferenceGateway::new(mock);

        let result = run(gateway.answer_text("Describe a Colles fracture"));
        prop_assert!(result.text().starts_with("Error generating AI response:"));
        prop_assert!(result.text().ends_with(message.as_str()));
    }
}
