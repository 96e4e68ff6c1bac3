//! # Request Orchestrator
//! Sequences one request: resolve location (optional) -> fetch weather ->
//! publish readings -> generate advisory -> publish advisory -> assemble.
//!
//! Policy: publishing is a side effect and never fails a request. Fetch fails
//! the request whenever weather is needed. Generation fails the request only
//! when the advisory is the artifact the caller asked for; on `/weather` it
//! just leaves the advisory out.

use std::fmt;
use std::sync::Arc;

use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::advisory::{build_provider, AdvisoryGenerator, DynProvider};
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::geo::{Coordinate, LocationResolver};
use crate::notify::{
    BlynkPublisher, Channel, Clock, PublishResult, PublishResults, RateLimiter, SystemClock,
};
use crate::weather::{DailyForecast, WeatherFetcher, WeatherReading};

/// Orchestration states. `Errored` is represented by the `Err` arm of each run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Resolving,
    Fetching,
    Publishing,
    Advising,
    AdvisoryPublishing,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Idle => "idle",
            Stage::Resolving => "resolving",
            Stage::Fetching => "fetching",
            Stage::Publishing => "publishing",
            Stage::Advising => "advising",
            Stage::AdvisoryPublishing => "advisory_publishing",
            Stage::Done => "done",
        };
        f.write_str(s)
    }
}

/// Tracks where a run is, for logs and for error attribution.
struct Run {
    endpoint: &'static str,
    stage: Stage,
}

impl Run {
    fn start(endpoint: &'static str) -> Self {
        Self {
            endpoint,
            stage: Stage::Idle,
        }
    }

    fn advance(&mut self, next: Stage) {
        debug!(endpoint = self.endpoint, from = %self.stage, to = %next, "stage transition");
        self.stage = next;
    }

    fn fail(&self, e: RelayError) -> RelayError {
        counter!("relay_requests_total", "endpoint" => self.endpoint, "outcome" => e.kind())
            .increment(1);
        warn!(
            endpoint = self.endpoint,
            stage = %self.stage,
            kind = e.kind(),
            error = %e,
            "request errored"
        );
        e
    }

    fn done(mut self) {
        self.advance(Stage::Done);
        counter!("relay_requests_total", "endpoint" => self.endpoint, "outcome" => "ok")
            .increment(1);
    }
}

/// Where the caller wants weather for. A name wins over coordinates.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationQuery {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeatherReport {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub reading: WeatherReading,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily: Option<DailyForecast>,
    /// Provider payload, passed through.
    pub weather: Value,
    /// Full advisory text; absent when generation failed.
    pub advisory: Option<String>,
    pub blynk_results: PublishResults,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub recommendation: String,
    pub latitude: f64,
    pub longitude: f64,
    pub reading: WeatherReading,
    pub blynk_results: PublishResults,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledAdvisory {
    pub message: String,
    pub advisory: String,
    pub blynk_results: PublishResults,
}

/// Readings used by the scheduled cycle.
pub const PLACEHOLDER_READING: WeatherReading = WeatherReading {
    temperature: Some(30.0),
    humidity: Some(80.0),
    pressure: None,
    uv_index: Some(5.0),
};

/// Message written to the test channel by `/blynk/test`.
pub const TEST_MESSAGE: &str = "Hello from the weather relay";

static PIN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^V(\d{1,3})$").expect("static regex"));

/// Accepts `V0`..`V255`.
pub fn validate_pin(pin: &str) -> Result<&str, RelayError> {
    let pin = pin.trim();
    let ok = PIN_RE
        .captures(pin)
        .and_then(|c| c[1].parse::<u16>().ok())
        .is_some_and(|n| n <= 255);
    if ok {
        Ok(pin)
    } else {
        Err(RelayError::bad_input(format!(
            "Invalid pin '{pin}': expected V0..V255"
        )))
    }
}

#[derive(Clone)]
pub struct Relay {
    resolver: LocationResolver,
    fetcher: WeatherFetcher,
    publisher: BlynkPublisher,
    generator: AdvisoryGenerator,
}

impl Relay {
    pub fn from_config(cfg: &RelayConfig) -> Result<Self, RelayError> {
        Self::with_clock(cfg, Arc::new(SystemClock))
    }

    /// Same as `from_config` with an injected limiter clock.
    pub fn with_clock(cfg: &RelayConfig, clock: Arc<dyn Clock>) -> Result<Self, RelayError> {
        let http = cfg.http.build_client()?;
        let provider = build_provider(http.clone(), &cfg.ai)?;
        Ok(Self::with_provider(cfg, http, provider, clock))
    }

    pub fn with_provider(
        cfg: &RelayConfig,
        http: reqwest::Client,
        provider: DynProvider,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::with_clock(cfg.dashboard.min_interval(), clock));
        Self {
            resolver: LocationResolver::new(http.clone(), cfg.weather.geocoding_url.clone()),
            fetcher: WeatherFetcher::new(
                http.clone(),
                cfg.weather.base_url.clone(),
                cfg.weather.include_daily,
            ),
            publisher: BlynkPublisher::new(http, &cfg.dashboard, limiter),
            generator: AdvisoryGenerator::new(provider, &cfg.ai),
        }
    }

    /// Resolve the location part of a request into a coordinate, before any weather call.
    async fn locate(
        &self,
        run: &mut Run,
        q: &LocationQuery,
    ) -> Result<(Coordinate, Option<String>), RelayError> {
        if let Some(name) = q.location.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            run.advance(Stage::Resolving);
            let coord = self.resolver.resolve(name).await?;
            return Ok((coord, Some(name.to_string())));
        }
        match (q.latitude, q.longitude) {
            (Some(lat), Some(lon)) => Ok((Coordinate::new(lat, lon)?, None)),
            _ => Err(RelayError::bad_input(
                "Latitude and longitude are required",
            )),
        }
    }

    /// `/weather`: weather is primary; publishing and advisory are side effects.
    pub async fn weather_report(&self, q: &LocationQuery) -> Result<WeatherReport, RelayError> {
        let mut run = Run::start("weather");

        let (coord, location) = self.locate(&mut run, q).await.map_err(|e| run.fail(e))?;

        run.advance(Stage::Fetching);
        let snapshot = self.fetcher.fetch(coord).await.map_err(|e| run.fail(e))?;

        run.advance(Stage::Publishing);
        let mut blynk_results = self.publisher.publish_reading(&snapshot).await;

        run.advance(Stage::Advising);
        let advisory = match self.generator.generate(&snapshot.reading, None).await {
            Ok(text) => Some(text),
            Err(e) => {
                info!(error = %e, "advisory omitted from weather report");
                None
            }
        };

        if let Some(text) = advisory.as_deref() {
            run.advance(Stage::AdvisoryPublishing);
            blynk_results.extend(self.publisher.publish_advisory(text).await);
        }

        run.done();
        Ok(WeatherReport {
            latitude: coord.latitude(),
            longitude: coord.longitude(),
            location,
            reading: snapshot.reading,
            daily: snapshot.daily,
            weather: snapshot.raw,
            advisory,
            blynk_results,
        })
    }

    /// `/recommendation`: the advisory is primary, so generation failure fails the call.
    pub async fn recommend(
        &self,
        query: Option<&str>,
        q: &LocationQuery,
    ) -> Result<Recommendation, RelayError> {
        let mut run = Run::start("recommendation");

        let query = query
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| run.fail(RelayError::bad_input("Query is required")))?;

        let (coord, _) = self.locate(&mut run, q).await.map_err(|e| run.fail(e))?;

        run.advance(Stage::Fetching);
        let snapshot = self.fetcher.fetch(coord).await.map_err(|e| run.fail(e))?;

        run.advance(Stage::Advising);
        let recommendation = self
            .generator
            .generate(&snapshot.reading, Some(query))
            .await
            .map_err(|e| run.fail(e))?;

        run.advance(Stage::AdvisoryPublishing);
        let blynk_results = self.publisher.publish_advisory(&recommendation).await;

        run.done();
        Ok(Recommendation {
            recommendation,
            latitude: coord.latitude(),
            longitude: coord.longitude(),
            reading: snapshot.reading,
            blynk_results,
        })
    }

    /// Fixed message on the test channel.
    pub async fn test_publish(&self) -> PublishResult {
        let res = self
            .publisher
            .publish(Channel::Test.pin(), TEST_MESSAGE)
            .await;
        let outcome = if res.is_ok() { "ok" } else { "publish_error" };
        counter!("relay_requests_total", "endpoint" => "blynk_test", "outcome" => outcome)
            .increment(1);
        res
    }

    /// Arbitrary pin write. The pin is validated before anything is sent.
    pub async fn send_pin(&self, pin: &str, value: &str) -> Result<PublishResult, RelayError> {
        let run = Run::start("blynk_send");
        let pin = validate_pin(pin).map_err(|e| run.fail(e))?;
        let res = self.publisher.publish(pin, value).await;
        run.done();
        Ok(res)
    }

    /// One advisory-and-publish cycle from placeholder readings.
    pub async fn send_scheduled_advisory(&self) -> Result<ScheduledAdvisory, RelayError> {
        let mut run = Run::start("schedule_notification");

        run.advance(Stage::Advising);
        let advisory = self
            .generator
            .generate(&PLACEHOLDER_READING, None)
            .await
            .map_err(|e| run.fail(e))?;

        run.advance(Stage::AdvisoryPublishing);
        let blynk_results = self.publisher.publish_advisory(&advisory).await;

        run.done();
        Ok(ScheduledAdvisory {
            message: "Scheduled AI advisory sent".to_string(),
            advisory,
            blynk_results,
        })
    }
}
