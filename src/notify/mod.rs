//! Dashboard Publisher: Blynk virtual-pin updates.

pub mod antiflutter;
pub mod blynk;

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::error::PublishError;

pub use antiflutter::{Clock, ManualClock, RateLimiter, SystemClock};
pub use blynk::BlynkPublisher;

/// Fixed field -> virtual pin mapping. Never changes while the process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Location,
    WeatherFetch,
    Latitude,
    Longitude,
    Pressure,
    Temperature,
    Humidity,
    UvIndex,
    Test,
    Advisory,
}

impl Channel {
    pub fn pin(self) -> &'static str {
        match self {
            Channel::Location => "V6",
            Channel::WeatherFetch => "V7",
            Channel::Latitude => "V8",
            Channel::Longitude => "V9",
            Channel::Pressure => "V10",
            Channel::Temperature => "V11",
            Channel::Humidity => "V12",
            Channel::UvIndex => "V13",
            Channel::Test => "V14",
            Channel::Advisory => "V15",
        }
    }

    /// Key used in response maps.
    pub fn key(self) -> &'static str {
        match self {
            Channel::Location => "location",
            Channel::WeatherFetch => "weather_fetch",
            Channel::Latitude => "latitude",
            Channel::Longitude => "longitude",
            Channel::Pressure => "pressure",
            Channel::Temperature => "temperature",
            Channel::Humidity => "humidity",
            Channel::UvIndex => "uv_index",
            Channel::Test => "test",
            Channel::Advisory => "advisory",
        }
    }
}

/// Outcome of one channel update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishResult {
    /// Raw acknowledgement text from the dashboard.
    Ok { response: String },
    Error {
        #[serde(serialize_with = "as_display")]
        error: PublishError,
    },
}

impl PublishResult {
    pub fn failed(error: PublishError) -> Self {
        Self::Error { error }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, PublishResult::Ok { .. })
    }

    pub fn error(&self) -> Option<&PublishError> {
        match self {
            PublishResult::Error { error } => Some(error),
            PublishResult::Ok { .. } => None,
        }
    }
}

fn as_display<S: Serializer>(e: &PublishError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(e)
}

/// Per-channel results of one request, keyed by field name.
pub type PublishResults = BTreeMap<String, PublishResult>;

/// Truncate to at most `cap` characters (not bytes).
pub fn cap_for_channel(text: &str, cap: usize) -> String {
    text.chars().take(cap).collect()
}
