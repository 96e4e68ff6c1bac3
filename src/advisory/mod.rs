//! Advisory Generator: weather reading (+ optional user query) -> one LLM completion.

pub mod ai_adapter;

use metrics::counter;
use tracing::{info, warn};

use crate::config::AiConfig;
use crate::error::RelayError;
use crate::weather::{format_value, WeatherReading, SENTINEL};
pub use ai_adapter::{
    build_provider, CompletionProvider, CompletionRequest, DynProvider, MockProvider,
    OpenAiProvider,
};

const ADVISORY_SYSTEM: &str = "You are an AI assistant providing weather advisories tailored for farmers. \
Give clear, practical farming tips.";

const QUERY_SYSTEM: &str = "You are an AI assistant for weather-based recommendations. \
Give clear, practical advice for outdoor and agricultural decisions.";

fn with_unit(v: Option<f64>, unit: &str) -> String {
    match v {
        Some(_) => format!("{}{unit}", format_value(v)),
        None => SENTINEL.to_string(),
    }
}

fn conditions(r: &WeatherReading) -> String {
    format!(
        "Temperature: {}, Humidity: {}, Pressure: {}, UV Index: {}",
        with_unit(r.temperature, "°C"),
        with_unit(r.humidity, "%"),
        with_unit(r.pressure, " hPa"),
        format_value(r.uv_index),
    )
}

/// Deterministic prompt pair for a reading and an optional free-text query.
pub fn build_prompt(reading: &WeatherReading, query: Option<&str>) -> (&'static str, String) {
    match query.map(str::trim).filter(|q| !q.is_empty()) {
        None => (
            ADVISORY_SYSTEM,
            format!(
                "Given these weather conditions: {}, what should a farmer do to protect crops and livestock?",
                conditions(reading)
            ),
        ),
        Some(q) => (
            QUERY_SYSTEM,
            format!(
                "Current weather conditions: {}.\nUser question: {q}",
                conditions(reading)
            ),
        ),
    }
}

#[derive(Clone)]
pub struct AdvisoryGenerator {
    provider: DynProvider,
    max_tokens: u32,
    query_max_tokens: u32,
    temperature: f32,
}

impl AdvisoryGenerator {
    pub fn new(provider: DynProvider, cfg: &AiConfig) -> Self {
        Self {
            provider,
            max_tokens: cfg.max_tokens,
            query_max_tokens: cfg.query_max_tokens,
            temperature: cfg.temperature,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Returns the full, untruncated completion.
    pub async fn generate(
        &self,
        reading: &WeatherReading,
        query: Option<&str>,
    ) -> Result<String, RelayError> {
        let (system, user) = build_prompt(reading, query);
        let has_query = query.is_some_and(|q| !q.trim().is_empty());
        let req = CompletionRequest {
            system,
            user: &user,
            max_tokens: if has_query {
                self.query_max_tokens
            } else {
                self.max_tokens
            },
            // Sampling temperature only applies to query-driven answers.
            temperature: has_query.then_some(self.temperature),
        };

        match self.provider.complete(req).await {
            Ok(text) => {
                counter!("relay_advisory_total", "outcome" => "ok").increment(1);
                info!(
                    provider = self.provider.name(),
                    chars = text.chars().count(),
                    "advisory generated"
                );
                Ok(text)
            }
            Err(e) => {
                counter!("relay_advisory_total", "outcome" => "error").increment(1);
                warn!(provider = self.provider.name(), error = %e, "advisory generation failed");
                // Anything the provider raised is a generation failure from here on.
                Err(match e {
                    RelayError::Generation(_) => e,
                    other => RelayError::generation(other.to_string()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records the request it saw and answers with a fixed text.
    struct Recording {
        answer: Result<String, String>,
        seen: Mutex<Vec<(String, String, u32, Option<f32>)>>,
    }

    #[async_trait]
    impl CompletionProvider for Recording {
        async fn complete(&self, req: CompletionRequest<'_>) -> Result<String, RelayError> {
            self.seen
                .lock()
                .push((
                    req.system.to_string(),
                    req.user.to_string(),
                    req.max_tokens,
                    req.temperature,
                ));
            self.answer.clone().map_err(RelayError::Generation)
        }
        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn reading() -> WeatherReading {
        WeatherReading {
            temperature: Some(30.0),
            humidity: Some(70.0),
            pressure: Some(1008.0),
            uv_index: Some(6.0),
        }
    }

    #[test]
    fn prompt_embeds_readings_and_sentinels() {
        let (sys, user) = build_prompt(
            &WeatherReading {
                pressure: None,
                ..reading()
            },
            None,
        );
        assert!(sys.contains("farmers"));
        assert!(user.contains("Temperature: 30°C"));
        assert!(user.contains("Humidity: 70%"));
        assert!(user.contains("Pressure: N/A"));
        assert!(user.contains("UV Index: 6"));
    }

    #[test]
    fn prompt_is_deterministic_and_appends_query() {
        let a = build_prompt(&reading(), Some("Should I spray today?"));
        let b = build_prompt(&reading(), Some("Should I spray today?"));
        assert_eq!(a, b);
        assert!(a.1.ends_with("User question: Should I spray today?"));

        // Blank query falls back to the plain advisory prompt.
        assert_eq!(build_prompt(&reading(), Some("  ")), build_prompt(&reading(), None));
    }

    #[tokio::test]
    async fn generate_returns_provider_text_and_picks_budget() {
        let rec = Arc::new(Recording {
            answer: Ok("Irrigate before noon.".into()),
            seen: Mutex::new(Vec::new()),
        });
        let g = AdvisoryGenerator::new(rec.clone(), &AiConfig::default());

        assert_eq!(
            g.generate(&reading(), None).await.unwrap(),
            "Irrigate before noon."
        );
        g.generate(&reading(), Some("Harvest now?")).await.unwrap();

        let seen = rec.seen.lock();
        assert_eq!(seen[0].2, 150);
        assert_eq!(seen[1].2, 1500);
    }

    #[tokio::test]
    async fn temperature_is_sent_only_with_a_query() {
        let rec = Arc::new(Recording {
            answer: Ok("ok".into()),
            seen: Mutex::new(Vec::new()),
        });
        let g = AdvisoryGenerator::new(rec.clone(), &AiConfig::default());

        g.generate(&reading(), None).await.unwrap();
        g.generate(&reading(), Some("  ")).await.unwrap();
        g.generate(&reading(), Some("Spray today?")).await.unwrap();

        let seen = rec.seen.lock();
        assert_eq!(seen[0].3, None);
        assert_eq!(seen[1].3, None);
        assert_eq!(seen[2].3, Some(0.7));
    }

    #[tokio::test]
    async fn long_text_is_returned_untruncated() {
        let long = "x".repeat(600);
        let rec = Arc::new(Recording {
            answer: Ok(long.clone()),
            seen: Mutex::new(Vec::new()),
        });
        let g = AdvisoryGenerator::new(rec, &AiConfig::default());
        assert_eq!(g.generate(&reading(), None).await.unwrap(), long);
    }

    #[tokio::test]
    async fn provider_failure_is_typed() {
        let rec = Arc::new(Recording {
            answer: Err("quota exceeded".into()),
            seen: Mutex::new(Vec::new()),
        });
        let g = AdvisoryGenerator::new(rec, &AiConfig::default());
        let err = g.generate(&reading(), None).await.unwrap_err();
        assert!(matches!(err, RelayError::Generation(_)));
    }
}
