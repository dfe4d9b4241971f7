//! 🚦 Per-sink rate limiting over trailing 60 s and 3600 s windows.
//! The velvet rope of the notification club.
//!
//! The history is a plain timestamp list guarded by the owning sink's
//! lock; entries older than an hour are purged on every decision. No
//! token buckets, no leaky buckets, no bucket-shaped abstractions at all
//! — just "how many did we send lately" counted honestly. 🦆

use std::time::{Duration, Instant};

use crate::store::model::RateLimitConfig;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

#[derive(Debug, Default)]
pub struct RateLimiter {
    history: Vec<Instant>,
}

impl RateLimiter {
    /// ⚖️ Decide whether a delivery at `now` is within the limits.
    /// Call [`RateLimiter::record`] only after the delivery succeeds —
    /// a failed POST should not count against anyone's allowance.
    pub fn allows(&mut self, limits: Option<&RateLimitConfig>, now: Instant) -> bool {
        self.history
            .retain(|stamp| now.duration_since(*stamp) < HOUR);
        let Some(limits) = limits else {
            return true;
        };
        if let Some(per_minute) = limits.max_per_minute {
            let recent = self
                .history
                .iter()
                .filter(|stamp| now.duration_since(**stamp) < MINUTE)
                .count();
            if recent >= per_minute as usize {
                return false;
            }
        }
        if let Some(per_hour) = limits.max_per_hour
            && self.history.len() >= per_hour as usize
        {
            return false;
        }
        true
    }

    pub fn record(&mut self, now: Instant) {
        self.history.push(now);
    }

    pub fn recent_count(&self, now: Instant) -> usize {
        self.history
            .iter()
            .filter(|stamp| now.duration_since(**stamp) < MINUTE)
            .count()
    }
}
