//! Typed errors for the summarization library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.

use thiserror::Error;
use uuid::Uuid;

/// Terminal errors for a summarization run.
#[derive(Debug, Error)]
pub enum SummarizationError {
    /// Input or configuration rejected before any work started
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Model call failed after the resilience layer gave up
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Storage operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A reduction level failed to shrink the hierarchy
    #[error("hierarchy stopped converging at level {level}: {detail}")]
    NonConvergence { level: i32, detail: String },

    /// Hierarchy grew past the depth ceiling
    #[error("hierarchy exceeded max depth {max_depth} at level {level}")]
    MaxDepthExceeded { level: i32, max_depth: i32 },

    /// Run exceeded its wall-clock deadline
    #[error("run timed out after {elapsed_ms}ms (limit {limit_ms}ms)")]
    Timeout { elapsed_ms: u64, limit_ms: u64 },

    /// Run was cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,
}

/// Errors raised while validating configuration or input documents.
///
/// These fail fast: nothing is persisted and nothing is retried.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// No input documents provided
    #[error("no documents provided")]
    NoDocuments,

    /// A document has no usable content
    #[error("document '{name}' is empty")]
    EmptyDocument { name: String },

    /// Batch size outside the supported range
    #[error("max_batch_tokens {value} outside allowed range {min}..={max}")]
    BatchTokensOutOfRange {
        value: usize,
        min: usize,
        max: usize,
    },

    /// Prompts plus safety margin consume the whole batch budget
    #[error(
        "prompt overhead ({prompt_tokens} tokens) plus safety margin ({safety_margin}) \
         leaves no content room in a {max_batch_tokens}-token batch"
    )]
    NoContentBudget {
        prompt_tokens: usize,
        safety_margin: usize,
        max_batch_tokens: usize,
    },

    /// Rate limit configured to zero
    #[error("requests_per_minute must be greater than zero")]
    ZeroRequestRate,

    /// Circuit breaker threshold configured to zero
    #[error("failure_threshold must be greater than zero")]
    ZeroFailureThreshold,

    /// Half-open trial count configured to zero
    #[error("half_open_requests must be greater than zero")]
    ZeroHalfOpenRequests,

    /// Jitter factor outside [0, 1)
    #[error("jitter_factor {value} must be within [0, 1)")]
    JitterOutOfRange { value: f64 },

    /// Model endpoint URL did not parse
    #[error("invalid endpoint URL: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    /// Required environment variable is not set
    #[error("missing environment variable {name}")]
    MissingEnvVar { name: String },
}

/// Errors from the language-model backend and its resilience wrappers.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Backend unreachable or returned a non-success status
    #[error("transport error: {0}")]
    Transport(String),

    /// Single call exceeded its request timeout
    #[error("model call timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// Summary was not meaningfully shorter than its input
    #[error("summary did not reduce input: {output_chars} chars from {input_chars}")]
    NonReducing {
        input_chars: usize,
        output_chars: usize,
    },

    /// Response JSON matched no known completion shape
    #[error("unrecognized response format: {detail}")]
    UnrecognizedResponse { detail: String },

    /// Circuit breaker rejected the call without attempting it
    #[error("service unavailable, retry after {retry_after_ms}ms")]
    CircuitOpen { retry_after_ms: u64 },
}

impl ModelError {
    /// Whether the retry policy should attempt the call again.
    ///
    /// Transport faults, timeouts, and quality failures are transient;
    /// a parser gap or an open circuit will not improve by retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::Transport(_) => true,
            ModelError::Timeout { .. } => true,
            ModelError::NonReducing { .. } => true,
            ModelError::UnrecognizedResponse { .. } => false,
            ModelError::CircuitOpen { .. } => false,
        }
    }

    /// Whether this failure indicates backend trouble the circuit breaker
    /// should account for. Quality and parsing failures prove the backend
    /// responded, so they stay neutral.
    pub fn counts_against_breaker(&self) -> bool {
        matches!(
            self,
            ModelError::Transport(_) | ModelError::Timeout { .. }
        )
    }
}

/// Errors from hierarchy storage backends.
///
/// Common connection-level causes are classified into variants with
/// actionable messages rather than surfacing raw driver errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database not reachable at the configured address
    #[error("cannot reach database ({detail}); check that the server is running and the connection URL is correct")]
    ConnectionRefused { detail: String },

    /// Credentials rejected
    #[error("database authentication failed ({detail}); check the credentials in the connection URL")]
    AuthFailed { detail: String },

    /// Named database missing
    #[error("database does not exist ({detail}); create it or fix the database name in the connection URL")]
    UnknownDatabase { detail: String },

    /// Referenced node is not stored
    #[error("node not found: {id}")]
    NodeNotFound { id: Uuid },

    /// Referenced run is not stored
    #[error("run not found: {batch_id}")]
    RunNotFound { batch_id: Uuid },

    /// Attempted second write to a node's summary
    #[error("summary already set on node {id}")]
    SummaryAlreadySet { id: Uuid },

    /// Any other backend failure
    #[error("storage error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(any(feature = "sqlite", feature = "postgres"))]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let detail = err.to_string();
        let lower = detail.to_lowercase();
        if lower.contains("connection refused")
            || lower.contains("connection reset")
            || lower.contains("could not connect")
        {
            StoreError::ConnectionRefused { detail }
        } else if lower.contains("password authentication failed")
            || lower.contains("access denied")
            || (lower.contains("role") && lower.contains("does not exist"))
        {
            StoreError::AuthFailed { detail }
        } else if lower.contains("database") && lower.contains("does not exist") {
            StoreError::UnknownDatabase { detail }
        } else {
            StoreError::Backend(Box::new(err))
        }
    }
}

/// Result type alias for summarization runs.
pub type Result<T> = std::result::Result<T, SummarizationError>;

/// Result type alias for model calls.
pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
