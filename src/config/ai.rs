// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value of `api_key` meaning "read it from OPENAI_API_KEY".
pub const API_KEY_FROM_ENV: &str = "ENV";

fn default_provider() -> String {
    "openai".to_string()
}
fn default_api_key() -> String {
    API_KEY_FROM_ENV.to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4".to_string()
}
fn default_max_tokens() -> u32 {
    150
}
fn default_query_max_tokens() -> u32 {
    1500
}
fn default_temperature() -> f32 {
    0.7
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// "openai" | "mock" (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    /// "ENV" means: read from OPENAI_API_KEY. Never read from or written to files.
    #[serde(skip, default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Output budget for weather-only advisories.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Output budget when the caller supplied a free-text query.
    #[serde(default = "default_query_max_tokens")]
    pub query_max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: default_api_key(),
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            query_max_tokens: default_query_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

// Never print the key itself; length is enough for diagnostics.
impl fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiConfig")
            .field("provider", &self.provider)
            .field("key_len", &self.resolved_key().map_or(0, str::len))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("query_max_tokens", &self.query_max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl AiConfig {
    pub fn is_mock(&self) -> bool {
        self.provider == "mock"
    }

    /// The usable key, if one was configured or resolved from the environment.
    pub fn resolved_key(&self) -> Option<&str> {
        let key = self.api_key.trim();
        if key.is_empty() || key.eq_ignore_ascii_case(API_KEY_FROM_ENV) {
            None
        } else {
            Some(key)
        }
    }

    /// Apply `AI_TEST_MODE`, `OPENAI_*` overrides from `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if lookup("AI_TEST_MODE").is_some_and(|v| v.eq_ignore_ascii_case("mock")) {
            self.provider = "mock".to_string();
        }
        if self.resolved_key().is_none() {
            if let Some(key) = lookup("OPENAI_API_KEY") {
                self.api_key = key;
            }
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.base_url = url;
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            self.model = model;
        }
        self.provider = self.provider.trim().to_lowercase();
    }

    pub fn validate(&self) -> Result<(), String> {
        match self.provider.as_str() {
            "mock" => {}
            "openai" => {
                if self.resolved_key().is_none() {
                    return Err(
                        "OPENAI_API_KEY is missing. Please set it in your environment.".to_string(),
                    );
                }
            }
            other => return Err(format!("Unsupported AI provider in config: {other}")),
        }
        if self.max_tokens == 0 || self.query_max_tokens == 0 {
            return Err("AI token budgets must be positive".to_string());
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!(
                "AI temperature {} outside 0.0..=2.0",
                self.temperature
            ));
        }
        Ok(())
    }
}
