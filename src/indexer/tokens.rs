//! Token estimation shared by every chunking path

/// Characters per token for the estimator. Every chunk, slice and merged
/// group is measured with this same ratio.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of a piece of text
pub fn estimate_tokens(text: &str) -> usize {
    tokens_for_chars(text.chars().count())
}

/// Token estimate for a known character count
pub fn tokens_for_chars(chars: usize) -> usize {
    chars.div_ceil(CHARS_PER_TOKEN)
}

/// Largest character count that still fits within `tokens`
pub fn chars_for_tokens(tokens: usize) -> usize {
    tokens * CHARS_PER_TOKEN
}
