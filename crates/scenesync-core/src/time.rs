//! Scene time and the logical clock
//!
//! Fade ticks and heartbeats are deadlines in scene time. The driver
//! advances a [`SyncClock`]; nothing in the core reads the OS clock, which
//! keeps every timer cancelable and every test deterministic.

use std::ops::{Add, Sub};
use std::time::Duration;

/// Scene time, microseconds since the context was created
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SceneTime(pub u64);

impl SceneTime {
    pub const ZERO: SceneTime = SceneTime(0);

    #[inline]
    pub fn from_micros(micros: u64) -> Self {
        SceneTime(micros)
    }

    #[inline]
    pub fn from_millis(millis: u64) -> Self {
        SceneTime(millis * 1000)
    }

    #[inline]
    pub fn as_micros(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn as_millis(self) -> u64 {
        self.0 / 1000
    }

    #[inline]
    pub fn saturating_add(self, duration: Duration) -> Self {
        SceneTime(self.0.saturating_add(duration.as_micros() as u64))
    }
}

impl Add<Duration> for SceneTime {
    type Output = SceneTime;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl Sub<SceneTime> for SceneTime {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: SceneTime) -> Self::Output {
        Duration::from_micros(self.0.saturating_sub(rhs.0))
    }
}

impl std::fmt::Debug for SceneTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t({}ms)", self.as_millis())
    }
}

/// Monotonic logical clock
/// INVARIANT: never moves backwards
#[derive(Debug, Default)]
pub struct SyncClock {
    value: SceneTime,
}

impl SyncClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by `dt`, returning the new time
    pub fn advance(&mut self, dt: Duration) -> SceneTime {
        self.value = self.value + dt;
        self.value
    }

    pub fn now(&self) -> SceneTime {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_time_arithmetic() {
        let t = SceneTime::from_millis(100) + Duration::from_millis(50);
        assert_eq!(t.as_millis(), 150);
        assert_eq!(t - SceneTime::from_millis(100), Duration::from_millis(50));
        // Never negative
        assert_eq!(SceneTime::ZERO - t, Duration::ZERO);
    }

    #[test]
    fn test_clock_advance() {
        let mut clock = SyncClock::new();
        clock.advance(Duration::from_millis(100));
        clock.advance(Duration::from_millis(100));
        assert_eq!(clock.now(), SceneTime::from_millis(200));
    }
}
