use std::sync::Arc;

use metrics::counter;
use reqwest::Client;
use tracing::{debug, warn};

use super::{cap_for_channel, Channel, PublishResult, PublishResults, RateLimiter};
use crate::config::DashboardConfig;
use crate::error::PublishError;
use crate::geo::Coordinate;
use crate::weather::WeatherSnapshot;

/// Blynk cloud HTTP API client (`/update`, `/logEvent`).
#[derive(Clone)]
pub struct BlynkPublisher {
    http: Client,
    base_url: String,
    token: Option<String>,
    limiter: Arc<RateLimiter>,
    advisory_cap: usize,
    event_code: String,
}

impl BlynkPublisher {
    pub fn new(http: Client, cfg: &DashboardConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            token: cfg.auth_token.clone().filter(|t| !t.trim().is_empty()),
            limiter,
            advisory_cap: cfg.advisory_cap,
            event_code: cfg.event_code.clone(),
        }
    }

    pub fn advisory_cap(&self) -> usize {
        self.advisory_cap
    }

    /// Update one virtual pin. Never fails the caller; the outcome is in the result.
    pub async fn publish(&self, channel: &str, value: &str) -> PublishResult {
        let url = format!("{}/update", self.base_url);
        let res = self.send(channel, &url, &[(channel, value)]).await;
        record(channel, &res);
        res
    }

    /// Fire a dashboard event (shows up in the device timeline / notifications).
    pub async fn log_event(&self, code: &str, description: &str) -> PublishResult {
        let url = format!("{}/logEvent", self.base_url);
        let key = format!("event:{code}");
        let description = cap_for_channel(description, self.advisory_cap);
        let res = self
            .send(
                &key,
                &url,
                &[
                    ("code", code),
                    ("priority", "WARNING"),
                    ("description", description.as_str()),
                ],
            )
            .await;
        record(&key, &res);
        res
    }

    /// Fan a reading plus its coordinate out over the fixed channel map.
    /// Fields the provider did not return are skipped, not sent.
    pub async fn publish_reading(&self, snapshot: &WeatherSnapshot) -> PublishResults {
        let coord: Coordinate = snapshot.coordinate;
        let r = &snapshot.reading;

        let fields: [(Channel, Option<String>); 8] = [
            (Channel::Latitude, Some(coord.latitude().to_string())),
            (Channel::Longitude, Some(coord.longitude().to_string())),
            (Channel::Pressure, r.pressure.map(|v| v.to_string())),
            (Channel::Temperature, r.temperature.map(|v| v.to_string())),
            (Channel::Humidity, r.humidity.map(|v| v.to_string())),
            (Channel::UvIndex, r.uv_index.map(|v| v.to_string())),
            (Channel::Location, Some(coord.to_string())),
            (Channel::WeatherFetch, Some("1".to_string())),
        ];

        let mut out = PublishResults::new();
        for (channel, value) in fields {
            let Some(value) = value else {
                debug!(channel = channel.key(), "reading absent; not published");
                continue;
            };
            let res = self.publish(channel.pin(), &value).await;
            out.insert(channel.key().to_string(), res);
        }
        out
    }

    /// Publish the capped advisory to its channel and raise the alert event.
    pub async fn publish_advisory(&self, advisory: &str) -> PublishResults {
        let capped = cap_for_channel(advisory, self.advisory_cap);
        let mut out = PublishResults::new();
        let res = self.publish(Channel::Advisory.pin(), &capped).await;
        out.insert(Channel::Advisory.key().to_string(), res);
        let ev = self.log_event(&self.event_code, &capped).await;
        out.insert("alert_event".to_string(), ev);
        out
    }

    async fn send(&self, limiter_key: &str, url: &str, params: &[(&str, &str)]) -> PublishResult {
        let Some(token) = self.token.as_deref() else {
            return PublishResult::failed(PublishError::MissingToken);
        };

        if let Err(wait) = self.limiter.try_acquire(limiter_key) {
            return PublishResult::failed(PublishError::RateLimited {
                channel: limiter_key.to_string(),
                retry_after_ms: u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            });
        }

        let resp = self
            .http
            .get(url)
            .query(&[("token", token)])
            .query(params)
            .send()
            .await;

        let resp = match resp {
            Ok(r) => r,
            Err(e) => return PublishResult::failed(transport(e)),
        };

        let status = resp.status();
        let body = match resp.text().await {
            Ok(b) => b,
            Err(e) => return PublishResult::failed(transport(e)),
        };

        if status.is_success() {
            PublishResult::Ok { response: body }
        } else {
            PublishResult::failed(PublishError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// The request URL carries the token as a query parameter, so it never goes into the error text.
fn transport(e: reqwest::Error) -> PublishError {
    PublishError::Transport(e.without_url().to_string())
}

fn record(channel: &str, res: &PublishResult) {
    match res {
        PublishResult::Ok { .. } => {
            counter!("relay_publish_total", "outcome" => "ok").increment(1);
            debug!(channel, "dashboard update acknowledged");
        }
        PublishResult::Error { error } => {
            let outcome = match error {
                PublishError::MissingToken => "missing_token",
                PublishError::RateLimited { .. } => "rate_limited",
                PublishError::Transport(_) => "transport",
                PublishError::Rejected { .. } => "rejected",
            };
            counter!("relay_publish_total", "outcome" => outcome).increment(1);
            warn!(channel, error = %error, "dashboard update failed");
        }
    }
}
