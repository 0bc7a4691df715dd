//! Fade state machine
//!
//! A fade episode ramps an item's opacity from fully visible down to zero on
//! a fixed tick, then commits the item as not visible. Ticks are deadlines in
//! scene time; canceling an episode drops its schedule, after which no tick
//! of that episode can run.
//!
//! ```text
//!            start_fade_out            level hits 0 / force_complete
//!   Idle ────────────────▶ FadingOut ────────────────────────────▶ Completed
//!    ▲                        │  ▲                                    │
//!    │          show          │  └── start_fade_out (restart from     │
//!    ├────────────────────────┘      current opacity)                 │
//!    └────────────────────────────── show ────────────────────────────┘
//! ```

use std::time::Duration;

use scenesync_core::{SceneTime, SyncError, SyncResult};

/// Fade timing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FadeConfig {
    /// Full ramp length, from opacity 1 to 0
    pub duration: Duration,
    /// Sampling period of the ramp
    pub tick: Duration,
}

impl Default for FadeConfig {
    fn default() -> Self {
        FadeConfig {
            duration: Duration::from_millis(5000),
            tick: Duration::from_millis(100),
        }
    }
}

impl FadeConfig {
    /// Number of opacity decrements in a full ramp.
    ///
    /// A remainder shorter than one tick is dropped; [`Self::validate`]
    /// rejects such configs.
    pub fn steps(&self) -> u32 {
        if self.tick.is_zero() {
            return 1;
        }
        let steps = self.duration.as_micros() / self.tick.as_micros();
        steps.clamp(1, u32::MAX as u128) as u32
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.tick.is_zero() {
            return Err(SyncError::InvalidConfig("fade tick must be non-zero".into()));
        }
        if self.duration < self.tick {
            return Err(SyncError::InvalidConfig(format!(
                "fade duration {:?} is shorter than one tick {:?}",
                self.duration, self.tick
            )));
        }
        if self.duration.as_micros() % self.tick.as_micros() != 0 {
            return Err(SyncError::InvalidConfig(format!(
                "fade duration {:?} is not a whole number of {:?} ticks",
                self.duration, self.tick
            )));
        }
        Ok(())
    }
}

/// Fade phase of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadePhase {
    /// No countdown running
    Idle,
    /// Opacity ramping down
    FadingOut,
    /// Ramp finished; opacity reset and item committed as not visible
    Completed,
}

/// How a fade episode ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeEnd {
    /// Ramp reached zero, or was forced to finish
    Completed,
    /// Ramp canceled by `show`
    Stopped,
}

/// Pending tick of one episode
#[derive(Debug, Clone, Copy)]
struct TickSchedule {
    next_at: SceneTime,
    episode: u64,
}

/// Per-item fade controller
#[derive(Debug, Clone)]
pub struct FadeController {
    phase: FadePhase,
    /// Opacity in ramp steps; `steps` is fully opaque
    level: u32,
    steps: u32,
    tick: Duration,
    schedule: Option<TickSchedule>,
    episode: u64,
}

impl FadeController {
    pub fn new(config: &FadeConfig) -> Self {
        let steps = config.steps();
        FadeController {
            phase: FadePhase::Idle,
            level: steps,
            steps,
            tick: config.tick,
            schedule: None,
            episode: 0,
        }
    }

    pub fn phase(&self) -> FadePhase {
        self.phase
    }

    /// Opacity in `[0, 1]`
    pub fn opacity(&self) -> f32 {
        self.level as f32 / self.steps as f32
    }

    /// Whether a tick schedule is armed
    pub fn is_ticking(&self) -> bool {
        self.schedule.is_some()
    }

    /// Deadline of the next tick, if any
    pub fn next_deadline(&self) -> Option<SceneTime> {
        self.schedule.map(|s| s.next_at)
    }

    /// Number of episodes started so far
    pub fn episode(&self) -> u64 {
        self.episode
    }

    /// Begin (or restart) the ramp.
    ///
    /// While already fading, the pending schedule is replaced and the ramp
    /// continues from the current opacity within the same episode.
    pub fn start_fade_out(&mut self, now: SceneTime) {
        match self.phase {
            FadePhase::FadingOut => {
                self.schedule = None;
            }
            FadePhase::Idle | FadePhase::Completed => {
                self.episode += 1;
                self.level = self.steps;
                self.phase = FadePhase::FadingOut;
            }
        }

        self.schedule = Some(TickSchedule {
            next_at: now + self.tick,
            episode: self.episode,
        });
    }

    /// Run every tick due at `now`
    pub fn advance(&mut self, now: SceneTime) -> Option<FadeEnd> {
        while let Some(schedule) = self.schedule {
            if schedule.next_at > now {
                return None;
            }
            debug_assert_eq!(schedule.episode, self.episode);

            self.level = self.level.saturating_sub(1);
            if self.level == 0 {
                return Some(self.complete());
            }

            self.schedule = Some(TickSchedule {
                next_at: schedule.next_at + self.tick,
                ..schedule
            });
        }
        None
    }

    /// Finish the running episode immediately
    pub fn force_complete(&mut self) -> Option<FadeEnd> {
        if self.phase == FadePhase::FadingOut {
            Some(self.complete())
        } else {
            None
        }
    }

    /// Cancel any ramp and return to fully visible. Idempotent.
    pub fn show(&mut self) -> Option<FadeEnd> {
        let stopped = self.phase == FadePhase::FadingOut;

        self.schedule = None;
        self.level = self.steps;
        self.phase = FadePhase::Idle;

        stopped.then_some(FadeEnd::Stopped)
    }

    fn complete(&mut self) -> FadeEnd {
        self.schedule = None;
        self.level = self.steps;
        self.phase = FadePhase::Completed;
        FadeEnd::Completed
    }
}
