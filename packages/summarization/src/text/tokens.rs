//! Token count estimation.
//!
//! Uses the common chars/4 heuristic rather than a real tokenizer. Batch
//! sizing only needs a stable, backend-agnostic signal, and the safety
//! margin in the batch budget absorbs the approximation error. Using the
//! same estimator everywhere keeps over/under-estimation biases consistent
//! instead of compounding.

/// Average characters per token assumed by the estimator.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of `text`.
///
/// Whitespace runs are collapsed before measuring so formatting differences
/// (indentation, blank lines) do not inflate the estimate. Returns 0 for
/// blank input.
pub fn estimate_tokens(text: &str) -> usize {
    normalize_whitespace(text).len().div_ceil(CHARS_PER_TOKEN)
}

/// Collapse whitespace runs into single spaces and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
