// src/notify/antiflutter.rs
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;

/// Time source for the limiter, swappable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += ChronoDuration::from_std(by).unwrap_or(ChronoDuration::zero());
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Minimum-spacing gate for dashboard sends.
/// - First send on a key always passes.
/// - Inside the interval, sends on that key are rejected, not queued.
/// - Check and record happen under one lock, so concurrent callers cannot both pass.
pub struct RateLimiter {
    min_interval: ChronoDuration,
    last_sent: Mutex<HashMap<String, DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self::with_clock(min_interval, Arc::new(SystemClock))
    }

    pub fn with_clock(min_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            min_interval: ChronoDuration::from_std(min_interval).unwrap_or(ChronoDuration::zero()),
            last_sent: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Claim a send slot for `key`. On rejection returns the remaining wait.
    pub fn try_acquire(&self, key: &str) -> Result<(), Duration> {
        let now = self.clock.now();
        let mut last = self.last_sent.lock();
        if let Some(prev) = last.get(key) {
            let elapsed = now.signed_duration_since(*prev);
            if elapsed < self.min_interval {
                let wait = (self.min_interval - elapsed).to_std().unwrap_or_default();
                return Err(wait);
            }
        }
        last.insert(key.to_string(), now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap(),
        ))
    }

    #[test]
    fn first_send_passes() {
        let rl = RateLimiter::with_clock(Duration::from_secs(5), clock());
        assert!(rl.try_acquire("V11").is_ok());
    }

    #[test]
    fn inside_interval_blocked_with_remaining_wait() {
        let c = clock();
        let rl = RateLimiter::with_clock(Duration::from_secs(5), c.clone());
        assert!(rl.try_acquire("V11").is_ok());
        c.advance(Duration::from_secs(2));
        assert_eq!(rl.try_acquire("V11"), Err(Duration::from_secs(3)));
    }

    #[test]
    fn after_interval_passes() {
        let c = clock();
        let rl = RateLimiter::with_clock(Duration::from_secs(5), c.clone());
        assert!(rl.try_acquire("V11").is_ok());
        c.advance(Duration::from_secs(5));
        assert!(rl.try_acquire("V11").is_ok());
    }

    #[test]
    fn keys_are_independent() {
        let rl = RateLimiter::with_clock(Duration::from_secs(5), clock());
        assert!(rl.try_acquire("V11").is_ok());
        assert!(rl.try_acquire("V12").is_ok());
        assert!(rl.try_acquire("V11").is_err());
    }

    #[test]
    fn concurrent_callers_get_one_slot() {
        let rl = Arc::new(RateLimiter::with_clock(Duration::from_secs(5), clock()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rl = rl.clone();
                std::thread::spawn(move || rl.try_acquire("V15").is_ok())
            })
            .collect();
        let passed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(passed, 1);
    }
}
