//! Error taxonomy for the relay.
//!
//! `RelayError` is what a request can fail with; `PublishError` only ever
//! ends up inside a per-channel `PublishResult` and never fails a request.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Request-level failures surfaced to the caller.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Missing or invalid coordinates, location, query or pin.
    #[error("{0}")]
    BadInput(String),

    /// Geocoding produced no match (or the geocoder was unreachable).
    #[error("Invalid location: no match for '{name}'")]
    LocationNotFound { name: String },

    /// Weather provider unreachable or returned an unusable payload.
    #[error("Weather API request failed: {message}")]
    Fetch {
        message: String,
        status: Option<u16>,
        body: Option<String>,
    },

    /// Language-model call failed.
    #[error("Advisory generation failed: {0}")]
    Generation(String),

    /// Required credential or setting absent/invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RelayError {
    pub fn bad_input<S: Into<String>>(message: S) -> Self {
        Self::BadInput(message.into())
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    pub fn generation<S: Into<String>>(message: S) -> Self {
        Self::Generation(message.into())
    }

    pub fn fetch<S: Into<String>>(message: S, status: Option<u16>, body: Option<String>) -> Self {
        Self::Fetch {
            message: message.into(),
            status,
            body,
        }
    }

    /// Short machine-readable kind, used for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::BadInput(_) => "bad_input",
            RelayError::LocationNotFound { .. } => "location_not_found",
            RelayError::Fetch { .. } => "fetch",
            RelayError::Generation(_) => "generation",
            RelayError::Config(_) => "config",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::BadInput(_) | RelayError::LocationNotFound { .. } => {
                StatusCode::BAD_REQUEST
            }
            RelayError::Fetch { .. } | RelayError::Generation(_) => StatusCode::BAD_GATEWAY,
            RelayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Per-channel dashboard failures. Recorded, never escalated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PublishError {
    #[error("BLYNK_AUTH_TOKEN is missing")]
    MissingToken,

    #[error("rate limited on {channel}: retry in {retry_after_ms} ms")]
    RateLimited { channel: String, retry_after_ms: u64 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("dashboard rejected update ({status}): {body}")]
    Rejected { status: u16, body: String },
}
