use std::sync::Arc;

use serde::Deserialize;
use shuttle_axum::axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::error::RelayError;
use crate::notify::PublishResult;
use crate::relay::{LocationQuery, Recommendation, Relay, ScheduledAdvisory, WeatherReport};

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/weather", get(weather_get).post(weather_post))
        .route(
            "/recommendation",
            get(recommendation_get).post(recommendation_post),
        )
        .route("/blynk/test", get(blynk_test))
        .route("/blynk/send", get(blynk_send))
        .route("/schedule_notification", get(schedule_notification))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

// Extractor rejections are client input errors and share the `{"error": ..}` body.
fn from_query<T>(q: Result<Query<T>, QueryRejection>) -> Result<T, RelayError> {
    q.map(|Query(v)| v)
        .map_err(|e| RelayError::bad_input(e.body_text()))
}

fn from_json<T>(b: Result<Json<T>, JsonRejection>) -> Result<T, RelayError> {
    b.map(|Json(v)| v)
        .map_err(|e| RelayError::bad_input(e.body_text()))
}

async fn weather_get(
    State(state): State<AppState>,
    q: Result<Query<LocationQuery>, QueryRejection>,
) -> Result<Json<WeatherReport>, RelayError> {
    let q = from_query(q)?;
    state.relay.weather_report(&q).await.map(Json)
}

async fn weather_post(
    State(state): State<AppState>,
    body: Result<Json<LocationQuery>, JsonRejection>,
) -> Result<Json<WeatherReport>, RelayError> {
    let q = from_json(body)?;
    state.relay.weather_report(&q).await.map(Json)
}

/// Query string / body for `/recommendation`. Kept flat: `serde(flatten)`
/// does not mix with numeric fields in query strings.
#[derive(Debug, Default, Deserialize)]
struct RecommendationReq {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    location: Option<String>,
}

impl RecommendationReq {
    fn split(self) -> (Option<String>, LocationQuery) {
        (
            self.query,
            LocationQuery {
                latitude: self.latitude,
                longitude: self.longitude,
                location: self.location,
            },
        )
    }
}

async fn recommendation_get(
    State(state): State<AppState>,
    req: Result<Query<RecommendationReq>, QueryRejection>,
) -> Result<Json<Recommendation>, RelayError> {
    let (query, loc) = from_query(req)?.split();
    state.relay.recommend(query.as_deref(), &loc).await.map(Json)
}

async fn recommendation_post(
    State(state): State<AppState>,
    body: Result<Json<RecommendationReq>, JsonRejection>,
) -> Result<Json<Recommendation>, RelayError> {
    let (query, loc) = from_json(body)?.split();
    state.relay.recommend(query.as_deref(), &loc).await.map(Json)
}

#[derive(serde::Serialize)]
struct BlynkResp {
    blynk_response: PublishResult,
}

async fn blynk_test(State(state): State<AppState>) -> Json<BlynkResp> {
    Json(BlynkResp {
        blynk_response: state.relay.test_publish().await,
    })
}

#[derive(Deserialize)]
struct SendParams {
    #[serde(default)]
    pin: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

async fn blynk_send(
    State(state): State<AppState>,
    p: Result<Query<SendParams>, QueryRejection>,
) -> Result<Json<BlynkResp>, RelayError> {
    let p = from_query(p)?;
    let pin = p
        .pin
        .ok_or_else(|| RelayError::bad_input("pin is required"))?;
    let value = p.value.unwrap_or_default();
    let blynk_response = state.relay.send_pin(&pin, &value).await?;
    Ok(Json(BlynkResp { blynk_response }))
}

async fn schedule_notification(
    State(state): State<AppState>,
) -> Result<Json<ScheduledAdvisory>, RelayError> {
    state.relay.send_scheduled_advisory().await.map(Json)
}
