//! HTTP adapter for OpenAI-compatible chat completion endpoints.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::error::{ModelError, ModelResult, ValidationError};
use crate::traits::{CompletionRequest, LanguageModel};

/// Environment variable naming the chat completion base URL.
pub const BASE_URL_ENV: &str = "SUMMARIZER_BASE_URL";

/// Environment variable holding the bearer token, when the endpoint
/// wants one.
pub const API_KEY_ENV: &str = "SUMMARIZER_API_KEY";

/// Environment variable naming the model.
pub const MODEL_ENV: &str = "SUMMARIZER_MODEL";

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Calls any OpenAI-compatible `/chat/completions` endpoint: OpenAI
/// itself, a local llama.cpp or vLLM server, or a proxy in front of
/// either.
#[derive(Debug, Clone)]
pub struct HttpModel {
    client: Client,
    endpoint: Url,
    api_key: Option<SecretString>,
    model: String,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

impl HttpModel {
    /// Point the adapter at `base_url`, e.g. `https://api.openai.com/v1`.
    pub fn new(base_url: &str, model: impl Into<String>) -> Result<Self, ValidationError> {
        let mut base = base_url.trim_end_matches('/').to_string();
        base.push('/');
        let endpoint = Url::parse(&base)?.join("chat/completions")?;
        Ok(Self {
            client: Client::new(),
            endpoint,
            api_key: None,
            model: model.into(),
        })
    }

    /// Configure from `SUMMARIZER_BASE_URL`, `SUMMARIZER_API_KEY`, and
    /// `SUMMARIZER_MODEL`. Only the base URL is required.
    pub fn from_env() -> Result<Self, ValidationError> {
        let base_url =
            std::env::var(BASE_URL_ENV).map_err(|_| ValidationError::MissingEnvVar {
                name: BASE_URL_ENV.to_string(),
            })?;
        let model = std::env::var(MODEL_ENV).unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let mut adapter = Self::new(&base_url, model)?;
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            adapter = adapter.with_api_key(key);
        }
        Ok(adapter)
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for HttpModel {
    async fn invoke(&self, request: &CompletionRequest) -> ModelResult<Value> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let mut http_request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(key) = &self.api_key {
            http_request = http_request.bearer_auth(key.expose_secret());
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(500).collect();
            return Err(ModelError::Transport(format!("{status}: {snippet}")));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ModelError::Transport(format!("invalid response body: {e}")))
    }
}
