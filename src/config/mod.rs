//! Process-wide relay configuration.
//!
//! Loaded once at startup: built-in defaults, then an optional TOML file
//! (`$RELAY_CONFIG_PATH` or `config/relay.toml`), then environment overrides.
//! Secrets (Blynk token, OpenAI key) only ever come from the environment.

pub mod ai;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::RelayError;
pub use ai::AiConfig;

// --- env defaults & names ---
pub const DEFAULT_RELAY_CONFIG_PATH: &str = "config/relay.toml";
pub const ENV_RELAY_CONFIG_PATH: &str = "RELAY_CONFIG_PATH";

fn default_weather_url() -> String {
    "https://api.open-meteo.com/v1/forecast".to_string()
}
fn default_geocoding_url() -> String {
    "https://geocoding-api.open-meteo.com/v1/search".to_string()
}
fn default_blynk_url() -> String {
    "https://blynk.cloud/external/api".to_string()
}
fn default_min_interval_ms() -> u64 {
    5_000
}
fn default_advisory_cap() -> usize {
    255
}
fn default_event_code() -> String {
    "ai_weather_alert".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_connect_timeout_secs() -> u64 {
    4
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default = "default_weather_url")]
    pub base_url: String,
    #[serde(default = "default_geocoding_url")]
    pub geocoding_url: String,
    /// Also request the daily max/min/precipitation block.
    #[serde(default = "default_true")]
    pub include_daily: bool,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: default_weather_url(),
            geocoding_url: default_geocoding_url(),
            include_daily: true,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_blynk_url")]
    pub base_url: String,
    #[serde(skip)]
    pub auth_token: Option<String>,
    /// Minimum spacing between two sends to the same channel.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// Transport limit for the advisory channel and event description.
    #[serde(default = "default_advisory_cap")]
    pub advisory_cap: usize,
    #[serde(default = "default_event_code")]
    pub event_code: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            base_url: default_blynk_url(),
            auth_token: None,
            min_interval_ms: default_min_interval_ms(),
            advisory_cap: default_advisory_cap(),
            event_code: default_event_code(),
        }
    }
}

impl fmt::Debug for DashboardConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DashboardConfig")
            .field("base_url", &self.base_url)
            .field("has_token", &self.auth_token.is_some())
            .field("min_interval_ms", &self.min_interval_ms)
            .field("advisory_cap", &self.advisory_cap)
            .field("event_code", &self.event_code)
            .finish()
    }
}

impl DashboardConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl HttpConfig {
    /// One client shared by every outbound component; every call is time-bounded.
    pub fn build_client(&self) -> Result<reqwest::Client, RelayError> {
        reqwest::Client::builder()
            .user_agent(concat!("weather-advisory-relay/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| RelayError::config(format!("cannot build HTTP client: {e}")))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Local wall-clock times ("HH:MM") for the recurring advisory. Empty disables it.
    #[serde(default)]
    pub times: Vec<String>,
}

impl ScheduleConfig {
    pub fn parsed_times(&self) -> Result<Vec<NaiveTime>, RelayError> {
        let mut out = Vec::with_capacity(self.times.len());
        for raw in &self.times {
            let t = NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|_| {
                RelayError::config(format!("Invalid schedule time '{raw}', expected HH:MM"))
            })?;
            out.push(t);
        }
        out.sort();
        out.dedup();
        Ok(out)
    }
}

impl RelayConfig {
    /// Load using `$RELAY_CONFIG_PATH` / `config/relay.toml` and the process environment.
    pub fn load() -> Result<Self, RelayError> {
        let lookup = |k: &str| std::env::var(k).ok().filter(|v| !v.trim().is_empty());

        let mut cfg = match lookup(ENV_RELAY_CONFIG_PATH) {
            Some(p) => {
                let path = PathBuf::from(p);
                if !path.exists() {
                    return Err(RelayError::config(
                        "RELAY_CONFIG_PATH points to non-existent path",
                    ));
                }
                Self::load_from_file(&path)?
            }
            None => {
                let path = PathBuf::from(DEFAULT_RELAY_CONFIG_PATH);
                if path.exists() {
                    Self::load_from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };

        cfg.apply_env_from(&lookup);
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, RelayError> {
        let data = fs::read_to_string(path).map_err(|e| {
            RelayError::config(format!("reading config from {}: {e}", path.display()))
        })?;
        toml::from_str(&data).map_err(|e| {
            RelayError::config(format!("parsing config {}: {e}", path.display()))
        })
    }

    /// Apply environment overrides through an injectable lookup.
    pub fn apply_env_from<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("OPEN_METEO_API") {
            self.weather.base_url = v;
        }
        if let Some(v) = lookup("GEOCODING_API") {
            self.weather.geocoding_url = v;
        }
        if let Some(v) = lookup("WEATHER_INCLUDE_DAILY") {
            self.weather.include_daily = parse_bool(&v).unwrap_or(self.weather.include_daily);
        }
        if let Some(v) = lookup("BLYNK_SERVER") {
            self.dashboard.base_url = v;
        }
        if let Some(v) = lookup("BLYNK_AUTH_TOKEN") {
            self.dashboard.auth_token = Some(v);
        }
        if let Some(ms) = lookup("BLYNK_MIN_INTERVAL_MS").and_then(|v| v.trim().parse().ok()) {
            self.dashboard.min_interval_ms = ms;
        }
        if let Some(s) = lookup("HTTP_TIMEOUT_SECS").and_then(|v| v.trim().parse().ok()) {
            self.http.timeout_secs = s;
        }
        if let Some(s) = lookup("HTTP_CONNECT_TIMEOUT_SECS").and_then(|v| v.trim().parse().ok()) {
            self.http.connect_timeout_secs = s;
        }
        if let Some(v) = lookup("ADVISORY_SCHEDULE") {
            self.schedule.times = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        self.ai.apply_env_from(lookup);
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        for (name, url) in [
            ("weather.base_url", &self.weather.base_url),
            ("weather.geocoding_url", &self.weather.geocoding_url),
            ("dashboard.base_url", &self.dashboard.base_url),
            ("ai.base_url", &self.ai.base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(RelayError::config(format!(
                    "{name} must be a valid HTTP or HTTPS URL"
                )));
            }
        }

        for (name, secs) in [
            ("http.timeout_secs", self.http.timeout_secs),
            ("http.connect_timeout_secs", self.http.connect_timeout_secs),
        ] {
            if !(1..=120).contains(&secs) {
                return Err(RelayError::config(format!(
                    "{name} must be between 1 and 120 seconds"
                )));
            }
        }

        if self.dashboard.advisory_cap == 0 {
            return Err(RelayError::config("dashboard.advisory_cap must be positive"));
        }

        self.schedule.parsed_times()?;
        self.ai.validate().map_err(RelayError::Config)?;
        Ok(())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
