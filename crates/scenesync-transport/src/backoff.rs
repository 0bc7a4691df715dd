//! Reconnect backoff

use std::time::Duration;

use rand::Rng;

/// Exponential backoff policy
#[derive(Clone, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub initial: Duration,
    /// Upper bound on any delay
    pub max: Duration,
    /// Growth factor per attempt
    pub multiplier: f64,
    /// Relative jitter, e.g. 0.1 for ±10 %
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffPolicy {
    /// No growth, no jitter
    pub fn fixed(delay: Duration) -> Self {
        BackoffPolicy {
            initial: delay,
            max: delay,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }
}

/// Backoff state across consecutive failed attempts
#[derive(Clone, Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Backoff { policy, attempt: 0 }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        self.next_delay_with(&mut rand::thread_rng())
    }

    pub fn next_delay_with<R: Rng>(&mut self, rng: &mut R) -> Duration {
        let base = self.policy.initial.as_secs_f64()
            * self.policy.multiplier.powi(self.attempt.min(32) as i32);
        let capped = base.min(self.policy.max.as_secs_f64());

        let jitter = self.policy.jitter.clamp(0.0, 1.0);
        let factor = if jitter > 0.0 {
            1.0 + rng.gen_range(-jitter..=jitter)
        } else {
            1.0
        };

        self.attempt = self.attempt.saturating_add(1);
        Duration::from_secs_f64((capped * factor).max(0.0))
    }

    /// Connection succeeded; start over
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
