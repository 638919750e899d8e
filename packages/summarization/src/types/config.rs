//! Tunables for summarization runs and model-call resilience.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Smallest accepted per-call token budget.
pub const MIN_BATCH_TOKENS: usize = 100;

/// Largest accepted per-call token budget.
pub const MAX_BATCH_TOKENS: usize = 32_768;

/// Controls how a corpus is chunked, batched, and condensed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizeConfig {
    /// Replaces the built-in system prompt when set. Default: `None`.
    pub system_prompt: Option<String>,
    /// Extra context prepended to every user prompt. Default: `None`.
    pub context_prompt: Option<String>,
    /// Token budget for one model call, prompt overhead included.
    /// Default: `2048`.
    pub max_batch_tokens: usize,
    /// Trailing context carried from one chunk into the next, in tokens.
    /// Default: `50`.
    pub chunk_overlap_tokens: usize,
    /// Tokens held back from the batch budget as slack for estimation
    /// error. Default: `100`.
    pub safety_margin_tokens: usize,
    /// Sampling temperature for summarization calls. Default: `0.3`.
    pub temperature: f64,
    /// Upper bound on generated summary length, in tokens. Default: `512`.
    pub max_summary_tokens: u32,
    /// Hierarchy levels allowed before a run aborts. Default: `10`.
    pub max_depth: i32,
    /// Wall-clock limit for one run, in milliseconds. Default: `300000`.
    pub run_timeout_ms: u64,
}

impl Default for SummarizeConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            context_prompt: None,
            max_batch_tokens: 2048,
            chunk_overlap_tokens: 50,
            safety_margin_tokens: 100,
            temperature: 0.3,
            max_summary_tokens: 512,
            max_depth: 10,
            run_timeout_ms: 300_000,
        }
    }
}

impl SummarizeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_context_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.context_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_batch_tokens(mut self, tokens: usize) -> Self {
        self.max_batch_tokens = tokens;
        self
    }

    pub fn with_chunk_overlap_tokens(mut self, tokens: usize) -> Self {
        self.chunk_overlap_tokens = tokens;
        self
    }

    pub fn with_safety_margin_tokens(mut self, tokens: usize) -> Self {
        self.safety_margin_tokens = tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_summary_tokens(mut self, tokens: u32) -> Self {
        self.max_summary_tokens = tokens;
        self
    }

    pub fn with_max_depth(mut self, depth: i32) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_run_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.run_timeout_ms = timeout_ms;
        self
    }

    /// Reject configurations the pipeline cannot honor.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(MIN_BATCH_TOKENS..=MAX_BATCH_TOKENS).contains(&self.max_batch_tokens) {
            return Err(ValidationError::BatchTokensOutOfRange {
                value: self.max_batch_tokens,
                min: MIN_BATCH_TOKENS,
                max: MAX_BATCH_TOKENS,
            });
        }
        Ok(())
    }
}

/// Retry, circuit breaker, and pacing settings for model calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Retries after the first attempt of a model call. Default: `3`.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds. Default: `1000`.
    pub initial_retry_delay_ms: u64,
    /// Multiplier applied to the delay after each retry. Default: `2.0`.
    pub backoff_multiplier: f64,
    /// Ceiling on any single retry delay, in milliseconds. Default: `30000`.
    pub max_retry_delay_ms: u64,
    /// Fraction of each delay that is randomized, in `[0, 1)`.
    /// Default: `0.1`.
    pub jitter_factor: f64,
    /// Consecutive failures that open the circuit. Default: `5`.
    pub failure_threshold: u32,
    /// How long the circuit stays open before probing resumes, in
    /// milliseconds. Default: `60000`.
    pub reset_timeout_ms: u64,
    /// Probe calls admitted while half-open. Default: `3`.
    pub half_open_requests: u32,
    /// Model calls admitted per minute. Default: `60`.
    pub requests_per_minute: u32,
    /// Per-attempt timeout for one model call, in milliseconds.
    /// Default: `60000`.
    pub request_timeout_ms: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_retry_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_retry_delay_ms: 30_000,
            jitter_factor: 0.1,
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
            half_open_requests: 3,
            requests_per_minute: 60,
            request_timeout_ms: 60_000,
        }
    }
}

impl ResilienceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_initial_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.initial_retry_delay_ms = delay_ms;
        self
    }

    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor;
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_reset_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.reset_timeout_ms = timeout_ms;
        self
    }

    pub fn with_half_open_requests(mut self, requests: u32) -> Self {
        self.half_open_requests = requests;
        self
    }

    pub fn with_requests_per_minute(mut self, rpm: u32) -> Self {
        self.requests_per_minute = rpm;
        self
    }

    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.requests_per_minute == 0 {
            return Err(ValidationError::ZeroRequestRate);
        }
        if self.failure_threshold == 0 {
            return Err(ValidationError::ZeroFailureThreshold);
        }
        if self.half_open_requests == 0 {
            return Err(ValidationError::ZeroHalfOpenRequests);
        }
        if !(0.0..1.0).contains(&self.jitter_factor) {
            return Err(ValidationError::JitterOutOfRange {
                value: self.jitter_factor,
            });
        }
        Ok(())
    }
}
