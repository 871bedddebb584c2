//! Completion service client.
//!
//! The rest of the crate only sees the [`CompletionClient`] trait. The
//! production implementation talks to an Azure OpenAI chat-completions
//! deployment; tests use [`StaticCompletion`] or their own fakes.

use crate::config::Config;
use crate::error::{PilotError, PilotResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Text-in, text-out completion service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send `prompt` and return the generated text.
    ///
    /// Every failure (transport, timeout, status, malformed body) is a
    /// `PilotError::Completion`. No retry is attempted.
    async fn complete(&self, prompt: &str, temperature: f32) -> PilotResult<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Debug, Deserialize)]
struct ChatContent {
    content: Option<String>,
}

/// Azure OpenAI chat-completions client.
#[derive(Debug, Clone)]
pub struct AzureOpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl AzureOpenAiClient {
    /// Build a client from the endpoint settings in `config`.
    pub fn new(config: &Config) -> PilotResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| PilotError::Config("api_key is not set".to_string()))?;
        let endpoint = Self::endpoint_url(config)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PilotError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint,
            api_key,
        })
    }

    /// `{api_base}openai/deployments/{deployment}/chat/completions?api-version={version}`
    pub fn endpoint_url(config: &Config) -> PilotResult<String> {
        let base = config
            .api_base
            .as_deref()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| PilotError::Config("api_base is not set".to_string()))?;
        let base = if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{}/", base)
        };
        Ok(format!(
            "{}openai/deployments/{}/chat/completions?api-version={}",
            base, config.deployment, config.api_version
        ))
    }
}

#[async_trait]
impl CompletionClient for AzureOpenAiClient {
    async fn complete(&self, prompt: &str, temperature: f32) -> PilotResult<String> {
        let body = ChatRequest {
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature,
        };

        debug!(prompt_len = prompt.len(), temperature, "sending completion request");

        let response = self
            .http
            .post(&self.endpoint)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PilotError::Completion(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PilotError::Completion(format!(
                "service returned {}: {}",
                status,
                detail.trim()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| PilotError::Completion(format!("malformed response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| PilotError::Completion("response contained no choices".to_string()))
    }
}

/// Completion stub that returns canned responses in order and records the
/// prompts it received. The last response repeats once the list runs out.
///
/// Meant for tests; it is not part of the prelude.
#[derive(Debug, Default)]
pub struct StaticCompletion {
    responses: Vec<String>,
    prompts: Mutex<Vec<(String, f32)>>,
}

impl StaticCompletion {
    pub fn new(response: impl Into<String>) -> Self {
        Self::sequence([response.into()])
    }

    pub fn sequence(responses: impl IntoIterator<Item = String>) -> Self {
        Self {
            responses: responses.into_iter().collect(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts and temperatures received so far.
    pub fn prompts(&self) -> Vec<(String, f32)> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CompletionClient for StaticCompletion {
    async fn complete(&self, prompt: &str, temperature: f32) -> PilotResult<String> {
        let mut prompts = self
            .prompts
            .lock()
            .map_err(|_| PilotError::Completion("stub state poisoned".to_string()))?;
        let index = prompts.len();
        prompts.push((prompt.to_string(), temperature));

        self.responses
            .get(index)
            .or_else(|| self.responses.last())
            .cloned()
            .ok_or_else(|| PilotError::Completion("no canned response".to_string()))
    }
}
