//! Token counting.
//!
//! All providers count with the `cl100k_base` BPE. It is exact for OpenAI
//! chat models and a close approximation for Claude and local models, whose
//! tokenizers are not published in a form we can load. If the BPE tables
//! cannot be loaded, counting falls back to one token per four characters.

use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;
use tracing::warn;

use mycoder_core::types::Message;

/// Fixed cost of one message's role and delimiters.
const MESSAGE_OVERHEAD: usize = 4;
/// Tokens that prime the assistant reply.
const REPLY_PRIMING: usize = 2;

static BPE: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn bpe() -> Option<&'static CoreBPE> {
    BPE.get_or_init(|| match tiktoken_rs::cl100k_base() {
        Ok(bpe) => Some(bpe),
        Err(e) => {
            warn!(error = %e, "Failed to load cl100k_base, approximating token counts");
            None
        }
    })
    .as_ref()
}

/// Count tokens in `text`.
pub fn count_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    match bpe() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => text.chars().count().div_ceil(4),
    }
}

/// Count tokens for a message list with `count` as the text counter.
///
/// Tool-call names and argument JSON are counted alongside the text, so the
/// total grows with every message appended.
pub fn count_message_tokens(messages: &[Message], count: impl Fn(&str) -> usize) -> usize {
    let body: usize = messages
        .iter()
        .map(|message| {
            let calls: usize = message
                .tool_calls()
                .iter()
                .map(|call| {
                    count(&call.name)
                        + count(&serde_json::Value::Object(call.arguments.clone()).to_string())
                })
                .sum();
            MESSAGE_OVERHEAD + count(&message.text()) + calls
        })
        .sum();
    body + REPLY_PRIMING
}
