// src/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, Local, NaiveDateTime, NaiveTime, TimeZone};
use metrics::{counter, gauge};
use tokio::task::JoinHandle;

use crate::relay::Relay;

/// Next wall-clock instant (strictly after `now`) matching one of `times`.
/// `times` must be non-empty.
pub fn next_fire<Tz: TimeZone>(now: &DateTime<Tz>, times: &[NaiveTime]) -> Option<DateTime<Tz>> {
    let tz = now.timezone();
    let today = now.date_naive();
    // Two days covers every time of day; a third absorbs DST gaps.
    for offset in 0..3u64 {
        let day = today.checked_add_days(Days::new(offset))?;
        for t in times {
            let naive = NaiveDateTime::new(day, *t);
            let Some(at) = tz.from_local_datetime(&naive).earliest() else {
                continue;
            };
            if at > *now {
                return Some(at);
            }
        }
    }
    None
}

/// Spawn the daily advisory loop. Each tick runs one scheduled cycle; failures
/// are logged and the loop carries on.
pub fn spawn_advisory_scheduler(relay: Arc<Relay>, mut times: Vec<NaiveTime>) -> JoinHandle<()> {
    times.sort();
    times.dedup();
    tokio::spawn(async move {
        if times.is_empty() {
            tracing::info!(target: "scheduler", "no advisory times configured; scheduler idle");
            return;
        }
        loop {
            let now = Local::now();
            let Some(at) = next_fire(&now, &times) else {
                tracing::warn!(target: "scheduler", "could not compute next advisory time; stopping");
                return;
            };
            let wait = (at.clone() - now).to_std().unwrap_or(Duration::ZERO);
            tracing::info!(target: "scheduler", next = %at, "advisory scheduled");
            tokio::time::sleep(wait).await;

            match relay.send_scheduled_advisory().await {
                Ok(out) => {
                    counter!("relay_scheduled_runs_total", "outcome" => "ok").increment(1);
                    tracing::info!(
                        target: "scheduler",
                        published = out.blynk_results.values().filter(|r| r.is_ok()).count(),
                        "scheduled advisory sent"
                    );
                }
                Err(e) => {
                    counter!("relay_scheduled_runs_total", "outcome" => "error").increment(1);
                    tracing::warn!(target: "scheduler", error = %e, "scheduled advisory failed");
                }
            }
            gauge!("relay_scheduled_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
        }
    })
}
