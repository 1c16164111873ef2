//! Prompt truncation to a token budget.
//!
//! Token counts are estimated with the `o200k_base` encoding used by
//! gpt-4o, whatever model actually serves the request.

use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;
use tracing::warn;

/// Token budget for every extraction prompt
pub const PROMPT_TOKEN_BUDGET: usize = 4000;

/// Rough characters-per-token ratio used if the encoder is unavailable
const CHARS_PER_TOKEN: usize = 4;

static ENCODER: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn encoder() -> Option<&'static CoreBPE> {
    ENCODER
        .get_or_init(|| match tiktoken_rs::o200k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                warn!(error = %e, "o200k_base encoder unavailable, truncating by characters");
                None
            }
        })
        .as_ref()
}

/// Number of tokens in `text`
pub fn count_tokens(text: &str) -> usize {
    match encoder() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => text.chars().count().div_ceil(CHARS_PER_TOKEN),
    }
}

/// Keep at most `budget` tokens of `text`.
pub fn truncate_to_tokens(text: &str, budget: usize) -> String {
    let Some(bpe) = encoder() else {
        return text.chars().take(budget * CHARS_PER_TOKEN).collect();
    };

    let tokens = bpe.encode_with_special_tokens(text);
    if tokens.len() <= budget {
        return text.to_string();
    }

    // A cut can land inside a multi-byte character; back off a few tokens
    // until the prefix decodes.
    let mut end = budget;
    while end > 0 && budget - end < 4 {
        if let Ok(prefix) = bpe.decode(tokens[..end].to_vec()) {
            return prefix;
        }
        end -= 1;
    }
    text.chars().take(budget * CHARS_PER_TOKEN).collect()
}
