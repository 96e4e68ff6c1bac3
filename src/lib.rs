// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod advisory;
pub mod api;
pub mod config;
pub mod error;
pub mod geo;
pub mod metrics;
pub mod notify;
pub mod relay;
pub mod scheduler;
pub mod weather;

use std::sync::Arc;

use axum::Router;

pub use crate::config::RelayConfig;
pub use crate::error::{PublishError, RelayError};
pub use crate::relay::Relay;

/// Full HTTP surface (API routes + `/metrics`) over an already-built relay.
pub fn router(relay: Arc<Relay>, cfg: &RelayConfig) -> Router {
    let metrics = crate::metrics::Metrics::init(cfg.dashboard.min_interval_ms);
    api::create_router(api::AppState { relay }).merge(metrics.router())
}

/// Build the relay from config and wrap it in the HTTP surface.
pub fn app(cfg: &RelayConfig) -> Result<(Arc<Relay>, Router), RelayError> {
    let relay = Arc::new(Relay::from_config(cfg)?);
    Ok((relay.clone(), router(relay, cfg)))
}
