//! Pipeline assembly: prompts, batch planning, and the controller.

pub mod batching;
pub mod controller;
pub mod prompts;

pub use batching::{plan_batches, BatchPlan};
pub use controller::Summarizer;
pub use prompts::SUMMARIZE_SYSTEM_PROMPT;
