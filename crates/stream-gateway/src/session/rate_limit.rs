//! Fixed-window send-rate cap, one per connection.
//!
//! The counter resets lazily on the first call after the window has elapsed;
//! there is no background timer. A burst straddling a window boundary can
//! admit up to twice the limit in a short span. That is the accepted cost of
//! a fixed window.

use crate::domain::config::RateLimitConfig;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Window {
    start: Option<Instant>,
    count: u32,
}

/// Per-connection fixed-window limiter.
#[derive(Debug)]
pub struct RateLimiter {
    enabled: bool,
    limit: u32,
    window: Duration,
    state: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            enabled: true,
            limit,
            window,
            state: Mutex::new(Window {
                start: None,
                count: 0,
            }),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            ..Self::new(config.events_per_window, config.window)
        }
    }

    /// Admit one event at `now`, or reject it.
    pub fn allow(&self, now: Instant) -> bool {
        if !self.enabled {
            return true;
        }

        let mut state = self.state.lock();
        let expired = match state.start {
            None => true,
            Some(start) => now.saturating_duration_since(start) >= self.window,
        };
        if expired {
            state.start = Some(now);
            state.count = 0;
        }

        if state.count >= self.limit {
            return false;
        }
        state.count += 1;
        true
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}
