//! Behavioral seams: the language model and the hierarchy store.

pub mod model;
pub mod store;

pub use model::{CompletionRequest, LanguageModel};
pub use store::HierarchyStore;
