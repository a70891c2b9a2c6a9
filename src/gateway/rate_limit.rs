//! Per-connection message rate limiting.
//!
//! Fixed windows: each connection may send `max_events` messages per window.
//! The first message after a window expires opens a new one.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::lobby::ConnectionId;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    enabled: bool,
    max_events: u32,
    window: Duration,
    windows: HashMap<ConnectionId, Window>,
}

impl RateLimiter {
    pub fn new(cfg: &RateLimitConfig) -> Self {
        RateLimiter {
            enabled: cfg.enabled,
            max_events: cfg.max_events.max(1),
            window: Duration::from_millis(cfg.window_ms.max(1)),
            windows: HashMap::new(),
        }
    }

    pub fn check(&mut self, conn: ConnectionId) -> Result<(), u64> {
        self.check_at(conn, Instant::now())
    }

    /// Count one message at `now`. `Err` carries the milliseconds until the
    /// window reopens.
    pub fn check_at(&mut self, conn: ConnectionId, now: Instant) -> Result<(), u64> {
        if !self.enabled {
            return Ok(());
        }
        let entry = self.windows.entry(conn).or_insert(Window { started: now, count: 0 });
        let elapsed = now.saturating_duration_since(entry.started);
        if elapsed >= self.window {
            *entry = Window { started: now, count: 0 };
        }
        if entry.count >= self.max_events {
            let remaining = self.window.saturating_sub(now.saturating_duration_since(entry.started));
            return Err(remaining.as_millis().max(1) as u64);
        }
        entry.count += 1;
        Ok(())
    }

    pub fn forget(&mut self, conn: ConnectionId) {
        self.windows.remove(&conn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u32, ms: u64) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig { enabled: true, max_events: max, window_ms: ms })
    }

    #[test]
    fn blocks_after_budget_then_reopens() {
        let mut rl = limiter(3, 1000);
        let t0 = Instant::now();
        let c = ConnectionId(1);
        for _ in 0..3 {
            assert!(rl.check_at(c, t0).is_ok());
        }
        let retry = rl.check_at(c, t0 + Duration::from_millis(400)).unwrap_err();
        assert_eq!(retry, 600);
        assert!(rl.check_at(ConnectionId(2), t0).is_ok(), "budgets are per connection");
        assert!(rl.check_at(c, t0 + Duration::from_millis(1000)).is_ok());
    }

    #[test]
    fn disabled_never_blocks() {
        let mut rl = RateLimiter::new(&RateLimitConfig { enabled: false, max_events: 1, window_ms: 1000 });
        let t0 = Instant::now();
        for _ in 0..10 {
            assert!(rl.check_at(ConnectionId(1), t0).is_ok());
        }
    }
}
