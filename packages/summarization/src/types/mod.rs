//! Core data types shared across the crate.

pub mod config;
pub mod node;
pub mod run;

pub use config::{ResilienceConfig, SummarizeConfig, MAX_BATCH_TOKENS, MIN_BATCH_TOKENS};
pub use node::{HierarchyNode, NewNode, NodeKind, SourceDocument, SOURCE_NAME_KEY};
pub use run::{RunOutcome, RunRecord, RunStatus};
