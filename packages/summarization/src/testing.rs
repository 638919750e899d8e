//! Test doubles for exercising the pipeline without a live backend.
//!
//! [`MockModel`] implements [`LanguageModel`] with scripted responses,
//! injectable failures, and call recording. It is public so downstream
//! crates and examples can run the full pipeline offline.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{ModelError, ModelResult};
use crate::traits::{CompletionRequest, LanguageModel};

/// A scripted language model.
///
/// Responses are consumed in order from the queues set up with the
/// builder methods. When the queues run dry the mock falls back to a
/// synthetic summary (roughly the first three fifths of the input), so
/// multi-level runs keep reducing without any scripting.
///
/// Clones share state, so a test can keep a handle for assertions after
/// moving the mock into a [`Summarizer`](crate::pipeline::Summarizer).
#[derive(Default, Clone)]
pub struct MockModel {
    responses: Arc<RwLock<VecDeque<String>>>,
    raw_responses: Arc<RwLock<VecDeque<Value>>>,
    fail_first: Arc<RwLock<u32>>,
    echo: bool,
    latency: Option<Duration>,
    calls: Arc<RwLock<Vec<CompletionRequest>>>,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a summary text, delivered wrapped in a chat-completion body.
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.responses.write().unwrap().push_back(text.into());
        self
    }

    /// Queue a raw JSON body, bypassing the chat-completion wrapper.
    /// Useful for driving the response parser through odd shapes.
    pub fn with_raw_response(self, body: Value) -> Self {
        self.raw_responses.write().unwrap().push_back(body);
        self
    }

    /// Fail the first `count` calls with a transport error before
    /// serving normal responses.
    pub fn with_fail_first(self, count: u32) -> Self {
        *self.fail_first.write().unwrap() = count;
        self
    }

    /// Echo the request's user content back verbatim. Trips the
    /// reduction quality check, which is exactly what a
    /// non-convergence test wants.
    pub fn with_echo(mut self) -> Self {
        self.echo = true;
        self
    }

    /// Sleep this long before answering each call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Every request received so far, in call order.
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    fn default_summary(user: &str) -> String {
        let total = user.chars().count();
        let keep = (total * 3 / 5).max(1);
        user.chars().take(keep).collect()
    }
}

fn chat_body(text: &str) -> Value {
    json!({
        "choices": [
            { "message": { "role": "assistant", "content": text } }
        ]
    })
}

#[async_trait]
impl LanguageModel for MockModel {
    async fn invoke(&self, request: &CompletionRequest) -> ModelResult<Value> {
        self.calls.write().unwrap().push(request.clone());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        {
            let mut remaining = self.fail_first.write().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ModelError::Transport("mock transport failure".into()));
            }
        }

        if let Some(body) = self.raw_responses.write().unwrap().pop_front() {
            return Ok(body);
        }

        if let Some(text) = self.responses.write().unwrap().pop_front() {
            return Ok(chat_body(&text));
        }

        if self.echo {
            return Ok(chat_body(&request.user));
        }

        Ok(chat_body(&Self::default_summary(&request.user)))
    }
}
