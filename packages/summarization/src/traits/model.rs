//! Language model abstraction.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ModelResult;

/// One completion request: a system instruction plus user content.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.3,
            max_tokens: 512,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A language model that can complete a prompt.
///
/// Implementations return the provider's raw JSON; extracting the
/// completion text from the many shapes providers use lives in
/// `crate::model::completion_text`, so every adapter shares the same
/// fallbacks.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn invoke(&self, request: &CompletionRequest) -> ModelResult<Value>;
}
