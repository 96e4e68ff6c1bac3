//! AI adapter: completion-provider abstraction + OpenAI and mock providers.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::AiConfig;
use crate::error::RelayError;

/// One single-shot, non-streaming completion call.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    pub max_tokens: u32,
    /// Provider default when `None`.
    pub temperature: Option<f32>,
}

/// Low-level provider: does the remote call. No history, no retries.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, req: CompletionRequest<'_>) -> Result<String, RelayError>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynProvider = Arc<dyn CompletionProvider>;

/// Factory: mock when configured so, otherwise OpenAI.
pub fn build_provider(http: Client, cfg: &AiConfig) -> Result<DynProvider, RelayError> {
    if cfg.is_mock() {
        return Ok(Arc::new(MockProvider::default()));
    }
    Ok(Arc::new(OpenAiProvider::new(http, cfg)?))
}

/// OpenAI Chat Completions.
pub struct OpenAiProvider {
    http: Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(http: Client, cfg: &AiConfig) -> Result<Self, RelayError> {
        let api_key = cfg
            .resolved_key()
            .ok_or_else(|| RelayError::config("OPENAI_API_KEY is missing"))?
            .to_string();
        Ok(Self {
            http,
            api_key,
            endpoint: format!("{}/chat/completions", cfg.base_url.trim_end_matches('/')),
            model: cfg.model.clone(),
        })
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatReq<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, req: CompletionRequest<'_>) -> Result<String, RelayError> {
        let body = ChatReq {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: req.system,
                },
                Msg {
                    role: "user",
                    content: req.user,
                },
            ],
            temperature: req.temperature,
            max_tokens: req.max_tokens,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::generation(format!("openai request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let text: String = text.chars().take(300).collect();
            return Err(RelayError::generation(format!(
                "openai returned {status}: {text}"
            )));
        }

        let parsed: ChatResp = resp
            .json()
            .await
            .map_err(|e| RelayError::generation(format!("openai response did not parse: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(RelayError::generation("openai returned an empty completion"));
        }
        Ok(content)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Deterministic provider for local runs (`AI_TEST_MODE=mock`) and tests.
#[derive(Debug, Clone)]
pub struct MockProvider {
    pub fixed: String,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            fixed: "Conditions look manageable (mock advisory).".to_string(),
        }
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    async fn complete(&self, _req: CompletionRequest<'_>) -> Result<String, RelayError> {
        Ok(self.fixed.clone())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
