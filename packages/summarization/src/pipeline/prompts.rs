//! Prompt assembly and token accounting.

use sha2::{Digest, Sha256};

use crate::text::estimate_tokens;
use crate::types::SummarizeConfig;

/// Built-in system prompt for condensation calls.
pub const SUMMARIZE_SYSTEM_PROMPT: &str = "\
You are a precise summarizer. Condense the provided material into a \
substantially shorter summary. Preserve concrete facts, names, figures, \
and causal links. When several labeled sources are given, merge \
overlapping points instead of repeating them. Respond with the summary \
text only.";

/// The system prompt a run will actually use.
pub fn resolved_system_prompt(config: &SummarizeConfig) -> &str {
    config
        .system_prompt
        .as_deref()
        .unwrap_or(SUMMARIZE_SYSTEM_PROMPT)
}

/// Label line for source number `index` (zero-based) named `name`.
pub fn source_label(index: usize, name: &str) -> String {
    format!("[Source {}: {}]", index + 1, name)
}

/// Join labeled payloads into one prompt body. A single part goes in
/// bare; labels appear only when there are several parts to keep apart.
pub fn label_sources(parts: &[(String, String)]) -> String {
    if parts.len() == 1 {
        return parts[0].1.clone();
    }
    parts
        .iter()
        .enumerate()
        .map(|(i, (name, payload))| format!("{}\n{}", source_label(i, name), payload))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// User message: optional run context, then the material.
pub fn format_user_content(config: &SummarizeConfig, body: &str) -> String {
    match &config.context_prompt {
        Some(context) => format!("{context}\n\n{body}"),
        None => body.to_string(),
    }
}

/// Tokens the prompts themselves consume in one call.
pub fn prompt_token_overhead(config: &SummarizeConfig) -> usize {
    let system = estimate_tokens(resolved_system_prompt(config));
    let context = config
        .context_prompt
        .as_deref()
        .map(estimate_tokens)
        .unwrap_or(0);
    system + context
}

/// Tokens left for content once prompts and the safety margin are paid
/// for, or `None` when nothing is left.
pub fn content_token_budget(config: &SummarizeConfig) -> Option<usize> {
    config
        .max_batch_tokens
        .checked_sub(prompt_token_overhead(config))?
        .checked_sub(config.safety_margin_tokens)
        .filter(|budget| *budget > 0)
}

/// Stable digest of the prompt configuration, stored with each run so a
/// rerun can be checked against the prompts that produced it.
pub fn prompt_hash(config: &SummarizeConfig) -> String {
    let mut hasher = Sha256::new();
    hasher.update(resolved_system_prompt(config).as_bytes());
    hasher.update([0u8]);
    hasher.update(config.context_prompt.as_deref().unwrap_or("").as_bytes());
    format!("{:x}", hasher.finalize())
}
