// tests/common/mod.rs
//
// Shared harness: one wiremock server stands in for geocoding, Open-Meteo,
// Blynk and OpenAI; the router is driven in-process via `oneshot`.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::{json, Value as Json};
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt as _;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use weather_advisory_relay::notify::ManualClock;
use weather_advisory_relay::{router, Relay, RelayConfig};

pub const BODY_LIMIT: usize = 1024 * 1024;

pub const FORECAST_PATH: &str = "/v1/forecast";
pub const GEOCODE_PATH: &str = "/v1/search";
pub const UPDATE_PATH: &str = "/external/api/update";
pub const EVENT_PATH: &str = "/external/api/logEvent";
pub const CHAT_PATH: &str = "/openai/chat/completions";

/// Config pointing every remote at `server`, OpenAI included.
pub fn config_for(server: &MockServer, token: Option<&str>) -> RelayConfig {
    let mut cfg = RelayConfig::default();
    cfg.weather.base_url = format!("{}{FORECAST_PATH}", server.uri());
    cfg.weather.geocoding_url = format!("{}{GEOCODE_PATH}", server.uri());
    cfg.dashboard.base_url = format!("{}/external/api", server.uri());
    cfg.dashboard.auth_token = token.map(str::to_string);
    cfg.ai.api_key = "sk-test".into();
    cfg.ai.base_url = format!("{}/openai", server.uri());
    cfg
}

pub fn test_router(cfg: &RelayConfig) -> Router {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 10, 19, 7, 0, 0).unwrap(),
    ));
    let relay = Relay::with_clock(cfg, clock).expect("relay builds from test config");
    router(Arc::new(relay), cfg)
}

pub async fn call(app: Router, method: &str, uri: &str, body: Option<Json>) -> (StatusCode, Json) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            req = req.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = app
        .oneshot(req.body(body).expect("build request"))
        .await
        .expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let v = serde_json::from_slice(&bytes).unwrap_or_else(|_| {
        Json::String(String::from_utf8_lossy(&bytes).into_owned())
    });
    (status, v)
}

pub fn manila_forecast() -> Json {
    json!({
        "latitude": 14.6,
        "longitude": 121.0,
        "current": {
            "time": "2026-10-19T07:00",
            "temperature_2m": 30.0,
            "relative_humidity_2m": 70,
            "pressure_msl": 1008.0,
            "uv_index": 6.0
        },
        "daily": {
            "time": ["2026-10-19"],
            "temperature_2m_max": [32.1],
            "temperature_2m_min": [25.4],
            "precipitation_sum": [3.2]
        }
    })
}

pub async fn mount_forecast(server: &MockServer, body: Json, expect: u64) {
    Mock::given(method("GET"))
        .and(path(FORECAST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expect)
        .mount(server)
        .await;
}

pub async fn mount_dashboard_ok(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(UPDATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("1"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(EVENT_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

pub async fn mount_completion(server: &MockServer, text: &str) {
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": text}}]
        })))
        .mount(server)
        .await;
}

pub async fn mount_completion_failure(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(server)
        .await;
}
