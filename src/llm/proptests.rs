//! Property-based tests for NDJSON stream decoding
//!
//! However the server's lines are cut into network reads, the decoder
//! yields the same fragments in the same order.

use super::ollama::ndjson_text_stream;
use futures::stream::{self, StreamExt};
use proptest::prelude::*;
use serde_json::json;
use std::convert::Infallible;

/// Fragments as a model would stream them, including empty and non-ASCII ones
fn arb_fragments() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-zA-Z0-9 .,;:!?\n\"\\\\éÖ→]{0,12}", 0..20)
}

fn encode(fragments: &[String]) -> Vec<u8> {
    let mut body = String::new();
    for fragment in fragments {
        body.push_str(&json!({"message": {"role": "assistant", "content": fragment}, "done": false}).to_string());
        body.push('\n');
    }
    body.push_str(&json!({"message": {"role": "assistant", "content": ""}, "done": true}).to_string());
    body.push('\n');
    body.into_bytes()
}

/// Cut `bytes` at the given (unsorted, possibly repeated) offsets
fn split_at_offsets(bytes: &[u8], offsets: &[usize]) -> Vec<Vec<u8>> {
    let mut cuts: Vec<usize> = offsets.iter().map(|o| o % (bytes.len() + 1)).collect();
    cuts.sort_unstable();
    cuts.dedup();

    let mut pieces = Vec::new();
    let mut start = 0;
    for cut in cuts {
        pieces.push(bytes[start..cut].to_vec());
        start = cut;
    }
    pieces.push(bytes[start..].to_vec());
    pieces
}

fn decode(pieces: Vec<Vec<u8>>) -> Vec<String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    runtime.block_on(async move {
        let source = stream::iter(pieces.into_iter().map(Ok::<_, Infallible>));
        ndjson_text_stream(source)
            .map(Result::unwrap)
            .collect()
            .await
    })
}

proptest! {
    #[test]
    fn prop_decoding_is_independent_of_read_boundaries(
        fragments in arb_fragments(),
        offsets in prop::collection::vec(any::<usize>(), 0..16),
    ) {
        let bytes = encode(&fragments);
        let decoded = decode(split_at_offsets(&bytes, &offsets));

        // Every fragment plus the empty terminal chunk, in order
        prop_assert_eq!(decoded.len(), fragments.len() + 1);
        prop_assert_eq!(&decoded[..fragments.len()], &fragments[..]);
        prop_assert_eq!(decoded.concat(), fragments.concat());
    }

    #[test]
    fn prop_one_byte_reads(fragments in arb_fragments()) {
        let bytes = encode(&fragments);
        let pieces: Vec<Vec<u8>> = bytes.iter().map(|b| vec![*b]).collect();
        prop_assert_eq!(decode(pieces).concat(), fragments.concat());
    }
}
