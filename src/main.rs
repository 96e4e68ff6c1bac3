//! Weather Advisory Relay - Binary Entrypoint
//! Loads config, boots the Axum router on Shuttle, and starts the optional
//! advisory scheduler.
//!
//! See `README.md` for the environment variables and endpoints.

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use weather_advisory_relay::{app, scheduler, RelayConfig};

/// Install our own subscriber in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - RELAY_DEV_LOG=1
///
/// `LOG_FORMAT=json` switches the output to JSON lines. `try_init` keeps us
/// from fighting a subscriber the runtime already installed.
fn enable_dev_tracing() {
    let dev_flag = std::env::var("RELAY_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("weather_advisory_relay=info,warn"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("subscriber already installed; keeping it");
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    // Missing OPENAI_API_KEY (outside mock mode) and malformed settings stop startup here.
    let cfg = RelayConfig::load().context("loading relay config")?;
    tracing::info!(?cfg, "relay config loaded");

    let (relay, router) = app(&cfg).context("building relay")?;

    let times = cfg.schedule.parsed_times().context("parsing advisory schedule")?;
    if !times.is_empty() {
        scheduler::spawn_advisory_scheduler(relay, times);
    }

    Ok(router.into())
}
