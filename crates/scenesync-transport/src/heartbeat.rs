//! Heartbeat schedule

use std::time::Duration;

use scenesync_core::SceneTime;

/// Periodic ping deadline, armed only while the session is open
#[derive(Debug, Clone)]
pub struct Heartbeat {
    interval: Duration,
    next_at: Option<SceneTime>,
}

impl Heartbeat {
    pub fn new(interval: Duration) -> Self {
        Heartbeat {
            interval,
            next_at: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_armed(&self) -> bool {
        self.next_at.is_some()
    }

    /// First ping one interval after `now`
    pub fn arm(&mut self, now: SceneTime) {
        self.next_at = Some(now + self.interval);
    }

    pub fn disarm(&mut self) {
        self.next_at = None;
    }

    /// Whether a ping is due at `now`. Missed slots collapse into one ping.
    pub fn poll(&mut self, now: SceneTime) -> bool {
        let Some(next_at) = self.next_at else {
            return false;
        };
        if next_at > now {
            return false;
        }
        let period = self.interval.as_micros().max(1) as u64;
        let missed = (now.as_micros() - next_at.as_micros()) / period;
        self.next_at = Some(SceneTime::from_micros(
            next_at.as_micros() + (missed + 1) * period,
        ));
        true
    }
}
