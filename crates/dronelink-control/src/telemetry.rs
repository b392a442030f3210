use std::time::{Duration, Instant};

use tracing::debug;

use crate::link::FlightLink;

/// Default time between battery queries.
pub const DEFAULT_TELEMETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Coarse, rate-limited battery cache.
///
/// The link is queried at most once per interval (the first time on the
/// first refresh) and always with `use_cached = true`, so a slow vehicle
/// never stalls the control tick. Between queries, and when a query returns
/// nothing, the last known level is kept.
#[derive(Debug, Clone)]
pub struct BatteryMonitor {
    interval: Duration,
    last_poll: Option<Instant>,
    level: Option<u8>,
    polls: u64,
}

impl BatteryMonitor {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_poll: None,
            level: None,
            polls: 0,
        }
    }

    /// Query the link if the interval has elapsed. Returns whether it did.
    pub fn refresh(&mut self, now: Instant, link: &mut dyn FlightLink) -> bool {
        let due = match self.last_poll {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if !due {
            return false;
        }

        self.last_poll = Some(now);
        self.polls += 1;
        match link.battery_status(true) {
            Some(level) => {
                debug!(level, "battery refreshed");
                self.level = Some(level.min(100));
            }
            None => debug!(last = ?self.level, "battery unavailable, keeping last value"),
        }
        true
    }

    /// Last known level, `None` if never obtained.
    pub fn level(&self) -> Option<u8> {
        self.level
    }

    pub fn polls(&self) -> u64 {
        self.polls
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for BatteryMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_TELEMETRY_INTERVAL)
    }
}
