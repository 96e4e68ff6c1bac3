//! Weather Fetcher: current conditions (+ optional daily block) from Open-Meteo.
//!
//! Absent numeric fields never fail a fetch. They stay `None` in
//! `WeatherReading` and render as the "N/A" sentinel wherever the value is
//! turned into text or JSON.

use std::time::Instant;

use metrics::{counter, histogram};
use reqwest::Client;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::geo::Coordinate;

/// Placeholder for a reading the provider did not return.
pub const SENTINEL: &str = "N/A";

const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,pressure_msl,uv_index";
const DAILY_FIELDS: &str = "temperature_2m_max,temperature_2m_min,precipitation_sum";
const MAX_DIAGNOSTIC_BODY: usize = 1024;

/// Render an optional reading the way downstream channels expect it.
pub fn format_value(v: Option<f64>) -> String {
    v.map_or_else(|| SENTINEL.to_string(), |x| x.to_string())
}

fn sentinel<S: Serializer>(v: &Option<f64>, s: S) -> Result<S::Ok, S::Error> {
    match v {
        Some(x) => s.serialize_f64(*x),
        None => s.serialize_str(SENTINEL),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WeatherReading {
    /// °C
    #[serde(serialize_with = "sentinel")]
    pub temperature: Option<f64>,
    /// relative humidity, %
    #[serde(serialize_with = "sentinel")]
    pub humidity: Option<f64>,
    /// mean sea level pressure, hPa
    #[serde(serialize_with = "sentinel")]
    pub pressure: Option<f64>,
    #[serde(serialize_with = "sentinel")]
    pub uv_index: Option<f64>,
}

impl WeatherReading {
    /// Extract the four readings from an Open-Meteo `current` object.
    pub fn from_current(current: &Value) -> Self {
        let num = |key: &str| current.get(key).and_then(Value::as_f64);
        Self {
            temperature: num("temperature_2m"),
            humidity: num("relative_humidity_2m"),
            pressure: num("pressure_msl"),
            uv_index: num("uv_index"),
        }
    }
}

/// Short-range daily forecast. Fetched when enabled, not needed by any consumer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default, rename = "temperature_2m_max")]
    pub temperature_max: Vec<Option<f64>>,
    #[serde(default, rename = "temperature_2m_min")]
    pub temperature_min: Vec<Option<f64>>,
    #[serde(default)]
    pub precipitation_sum: Vec<Option<f64>>,
}

/// Everything one fetch produced.
#[derive(Debug, Clone)]
pub struct WeatherSnapshot {
    pub coordinate: Coordinate,
    pub reading: WeatherReading,
    pub daily: Option<DailyForecast>,
    /// Provider payload as received.
    pub raw: Value,
}

#[derive(Clone)]
pub struct WeatherFetcher {
    http: Client,
    url: String,
    include_daily: bool,
}

impl WeatherFetcher {
    pub fn new(http: Client, url: impl Into<String>, include_daily: bool) -> Self {
        Self {
            http,
            url: url.into(),
            include_daily,
        }
    }

    /// Single attempt; any failure is returned with provider diagnostics.
    pub async fn fetch(&self, coord: Coordinate) -> Result<WeatherSnapshot, RelayError> {
        let started = Instant::now();
        let res = self.fetch_inner(coord).await;
        let outcome = if res.is_ok() { "ok" } else { "error" };
        counter!("relay_fetch_total", "outcome" => outcome).increment(1);
        histogram!("relay_fetch_ms").record(started.elapsed().as_secs_f64() * 1000.0);
        res
    }

    async fn fetch_inner(&self, coord: Coordinate) -> Result<WeatherSnapshot, RelayError> {
        let mut query: Vec<(&str, String)> = vec![
            ("latitude", coord.latitude().to_string()),
            ("longitude", coord.longitude().to_string()),
            ("current", CURRENT_FIELDS.to_string()),
            ("timezone", "auto".to_string()),
        ];
        if self.include_daily {
            query.push(("daily", DAILY_FIELDS.to_string()));
        }

        debug!(%coord, include_daily = self.include_daily, "fetching weather");

        let resp = self
            .http
            .get(&self.url)
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                warn!(%coord, error = %e, "weather request failed");
                RelayError::fetch(e.to_string(), None, None)
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            RelayError::fetch(
                format!("reading weather response: {e}"),
                Some(status.as_u16()),
                None,
            )
        })?;

        if !status.is_success() {
            warn!(%coord, %status, "weather provider returned non-2xx");
            return Err(RelayError::fetch(
                format!("Failed to fetch weather data: {status}"),
                Some(status.as_u16()),
                Some(clip(&body)),
            ));
        }

        let raw: Value = serde_json::from_str(&body).map_err(|e| {
            RelayError::fetch(
                format!("malformed weather response: {e}"),
                Some(status.as_u16()),
                Some(clip(&body)),
            )
        })?;

        let current = raw
            .get("current")
            .filter(|c| c.is_object())
            .ok_or_else(|| {
                RelayError::fetch(
                    "Invalid weather API response: missing current conditions",
                    Some(status.as_u16()),
                    Some(clip(&body)),
                )
            })?;

        let reading = WeatherReading::from_current(current);
        let daily = if self.include_daily {
            raw.get("daily")
                .and_then(|d| serde_json::from_value::<DailyForecast>(d.clone()).ok())
        } else {
            None
        };

        info!(
            %coord,
            temperature = %format_value(reading.temperature),
            humidity = %format_value(reading.humidity),
            pressure = %format_value(reading.pressure),
            uv_index = %format_value(reading.uv_index),
            "weather fetched"
        );

        Ok(WeatherSnapshot {
            coordinate: coord,
            reading,
            daily,
            raw,
        })
    }
}

fn clip(body: &str) -> String {
    body.chars().take(MAX_DIAGNOSTIC_BODY).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn manila() -> Coordinate {
        Coordinate::new(14.5995, 120.9842).unwrap()
    }

    #[test]
    fn missing_fields_render_as_sentinel() {
        let r = WeatherReading::from_current(&json!({"temperature_2m": 30, "uv_index": null}));
        assert_eq!(r.temperature, Some(30.0));
        assert_eq!(r.uv_index, None);
        assert_eq!(format_value(r.temperature), "30");
        assert_eq!(format_value(r.humidity), "N/A");

        let v = serde_json::to_value(r).unwrap();
        assert_eq!(v["temperature"], json!(30.0));
        assert_eq!(v["pressure"], json!("N/A"));
    }

    #[tokio::test]
    async fn parses_current_block() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("latitude", "14.5995"))
            .and(query_param("current", CURRENT_FIELDS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "current": {
                    "temperature_2m": 30,
                    "relative_humidity_2m": 70,
                    "pressure_msl": 1008,
                    "uv_index": 6
                },
                "daily": {
                    "time": ["2026-10-19"],
                    "temperature_2m_max": [32.1],
                    "temperature_2m_min": [25.4],
                    "precipitation_sum": [null]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = WeatherFetcher::new(Client::new(), server.uri(), true);
        let snap = fetcher.fetch(manila()).await.unwrap();
        assert_eq!(
            snap.reading,
            WeatherReading {
                temperature: Some(30.0),
                humidity: Some(70.0),
                pressure: Some(1008.0),
                uv_index: Some(6.0),
            }
        );
        let daily = snap.daily.unwrap();
        assert_eq!(daily.temperature_max, vec![Some(32.1)]);
        assert_eq!(daily.precipitation_sum, vec![None]);
    }

    #[tokio::test]
    async fn partial_current_block_is_tolerated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"current": {"temperature_2m": 21.5}})),
            )
            .mount(&server)
            .await;

        let fetcher = WeatherFetcher::new(Client::new(), server.uri(), false);
        let snap = fetcher.fetch(manila()).await.unwrap();
        assert_eq!(snap.reading.temperature, Some(21.5));
        assert_eq!(snap.reading.humidity, None);
        assert!(snap.daily.is_none());
    }

    #[tokio::test]
    async fn non_success_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                r#"{"error":true,"reason":"Latitude must be in range of -90 to 90°"}"#,
            ))
            .mount(&server)
            .await;

        let fetcher = WeatherFetcher::new(Client::new(), server.uri(), true);
        match fetcher.fetch(manila()).await {
            Err(RelayError::Fetch { status, body, .. }) => {
                assert_eq!(status, Some(400));
                assert!(body.unwrap().contains("Latitude must be"));
            }
            other => panic!("expected fetch error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_current_block_is_a_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hourly": {}})))
            .mount(&server)
            .await;

        let fetcher = WeatherFetcher::new(Client::new(), server.uri(), true);
        let err = fetcher.fetch(manila()).await.unwrap_err();
        assert!(matches!(err, RelayError::Fetch { status: Some(200), .. }));
    }

    #[tokio::test]
    async fn malformed_body_is_a_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let fetcher = WeatherFetcher::new(Client::new(), server.uri(), true);
        let err = fetcher.fetch(manila()).await.unwrap_err();
        assert!(err.to_string().contains("malformed"));
    }
}
