//! Hierarchical Recursive Summarization Library
//!
//! Condenses document collections of any size into a single summary by
//! building a tree of intermediate summaries bottom-up, so no single
//! model call ever sees more text than fits its context window.
//!
//! # How a run works
//!
//! Source documents land at level 0 of a persistent hierarchy. Each
//! reduction pass groups the nodes of the current level into batches
//! that fit the token budget (chunking any node too large for a batch
//! of its own), summarizes each batch, and writes the results one level
//! up. Passes repeat until a single node remains. Every intermediate
//! node is kept, so a finished run can be audited from the root summary
//! down to the exact source text that fed it.
//!
//! Model calls go through a resilience stack (rate pacing, circuit
//! breaker, retries with jittered backoff, per-call timeout), and every
//! summary is checked for actual reduction before it is accepted.
//!
//! # Usage
//!
//! ```rust,ignore
//! use summarization::{MemoryStore, SourceDocument, Summarizer};
//! use summarization::testing::MockModel;
//!
//! let summarizer = Summarizer::new(MemoryStore::new(), MockModel::new());
//!
//! let documents = vec![
//!     SourceDocument::new("minutes.txt", "The committee met at noon. ..."),
//!     SourceDocument::new("report.txt", "Quarterly numbers improved. ..."),
//! ];
//!
//! let outcome = summarizer.run(&documents).await?;
//! println!("{}", outcome.final_summary);
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (LanguageModel, HierarchyStore)
//! - [`types`] - Nodes, run records, and configuration
//! - [`text`] - Token estimation and sentence-aware chunking
//! - [`resilience`] - Retry, circuit breaker, and request pacing
//! - [`model`] - HTTP model adapter and response parsing
//! - [`pipeline`] - Batch planning and the reduction controller
//! - [`stores`] - Storage implementations (MemoryStore, SQL backends)
//! - [`testing`] - Mock model for offline runs

pub mod error;
pub mod model;
pub mod pipeline;
pub mod resilience;
pub mod stores;
pub mod testing;
pub mod text;
pub mod traits;
pub mod types;

// Re-export error types at crate root
pub use error::{
    ModelError, ModelResult, Result, StoreError, StoreResult, SummarizationError, ValidationError,
};

// Re-export core traits
pub use traits::{CompletionRequest, HierarchyStore, LanguageModel};

// Re-export data types
pub use types::{
    HierarchyNode, NewNode, NodeKind, ResilienceConfig, RunOutcome, RunRecord, RunStatus,
    SourceDocument, SummarizeConfig, MAX_BATCH_TOKENS, MIN_BATCH_TOKENS, SOURCE_NAME_KEY,
};

// Re-export the controller and pipeline helpers
pub use pipeline::{plan_batches, BatchPlan, Summarizer, SUMMARIZE_SYSTEM_PROMPT};

// Re-export text utilities
pub use text::{
    estimate_tokens, normalize_whitespace, split_into_chunks, split_sentences, CHARS_PER_TOKEN,
};

// Re-export the resilience stack
pub use resilience::{CircuitBreaker, CircuitState, RequestPacer, Resilience, RetryPolicy};

// Re-export model adapters
pub use model::{completion_text, HttpModel};

// Re-export stores
pub use stores::MemoryStore;

#[cfg(feature = "sqlite")]
pub use stores::SqliteStore;

#[cfg(feature = "postgres")]
pub use stores::PostgresStore;

// Re-export testing utilities
pub use testing::MockModel;
