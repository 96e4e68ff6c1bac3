use std::sync::OnceLock;

use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram, gauge, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder once per process and describe the relay series.
    /// Later calls (tests building several routers) share the first handle.
    pub fn init(min_interval_ms: u64) -> Self {
        let handle = HANDLE
            .get_or_init(|| {
                let builder = PrometheusBuilder::new();
                match builder.install_recorder() {
                    Ok(h) => h,
                    Err(e) => {
                        // Some other recorder owns the process; render an empty local one.
                        tracing::warn!(error = %e, "prometheus recorder not installed");
                        PrometheusBuilder::new().build_recorder().handle()
                    }
                }
            })
            .clone();

        describe_counter!("relay_requests_total", "Inbound requests by endpoint and outcome");
        describe_counter!("relay_publish_total", "Dashboard channel updates by outcome");
        describe_counter!("relay_advisory_total", "Advisory generations by outcome");
        describe_counter!("relay_fetch_total", "Weather provider fetches by outcome");
        describe_histogram!(
            "relay_fetch_ms",
            Unit::Milliseconds,
            "Weather provider round-trip time"
        );

        // Static gauge with the configured per-channel publish interval.
        gauge!("relay_publish_min_interval_ms").set(min_interval_ms as f64);

        Self { handle }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
