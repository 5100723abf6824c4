//! Watch timer
//!
//! Counts whole seconds of confirmed playback. The tick loop itself lives in
//! the controller; this type holds the counter and decides, tick by tick,
//! whether a tick counts. Gates are read fresh on every tick and never
//! captured at start time.

use serde::{Deserialize, Serialize};

/// Conditions that must all hold for a tick to count
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gates {
    /// Bridge reports confirmed playback
    pub playing: bool,
    /// Host screen/tab has focus
    pub screen_focused: bool,
    /// Host application is in the foreground
    pub app_foreground: bool,
    /// Held by a buffering or error event
    pub held: bool,
    /// A reward claim is outstanding
    pub claim_pending: bool,
}

impl Gates {
    pub fn all_open(&self) -> bool {
        self.playing && self.screen_focused && self.app_foreground && !self.held && !self.claim_pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    #[default]
    Idle,
    Running,
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Timer not running; the loop should exit
    Idle,
    /// A gate was closed, tick skipped
    Gated,
    Counted { accumulated: u32 },
    /// Target reached; signalled exactly once, timer back to idle
    Completed { accumulated: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchTimer {
    phase: TimerPhase,
    accumulated: u32,
    target: u32,
    completion_signalled: bool,
}

impl WatchTimer {
    pub fn new(target: u32) -> Self {
        Self {
            phase: TimerPhase::Idle,
            accumulated: 0,
            target,
            completion_signalled: false,
        }
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == TimerPhase::Running
    }

    pub fn accumulated(&self) -> u32 {
        self.accumulated
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    pub fn remaining(&self) -> u32 {
        self.target.saturating_sub(self.accumulated)
    }

    pub fn target_reached(&self) -> bool {
        self.accumulated >= self.target
    }

    /// Enter `Running` if all gates hold and the target is still ahead.
    /// Returns true only when a new tick loop has to be spawned.
    pub fn start(&mut self, gates: &Gates) -> bool {
        if self.phase == TimerPhase::Running || self.target_reached() || !gates.all_open() {
            return false;
        }
        self.phase = TimerPhase::Running;
        true
    }

    /// Returns true if the timer was running
    pub fn stop(&mut self) -> bool {
        std::mem::replace(&mut self.phase, TimerPhase::Idle) == TimerPhase::Running
    }

    pub fn tick(&mut self, gates: &Gates) -> TickOutcome {
        if self.phase != TimerPhase::Running {
            return TickOutcome::Idle;
        }
        if !gates.all_open() {
            return TickOutcome::Gated;
        }

        self.accumulated = self.accumulated.saturating_add(1);
        if self.target_reached() && !self.completion_signalled {
            self.completion_signalled = true;
            self.phase = TimerPhase::Idle;
            return TickOutcome::Completed {
                accumulated: self.accumulated,
            };
        }
        TickOutcome::Counted {
            accumulated: self.accumulated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> Gates {
        Gates {
            playing: true,
            screen_focused: true,
            app_foreground: true,
            held: false,
            claim_pending: false,
        }
    }

    #[test]
    fn test_start_requires_gates() {
        let mut timer = WatchTimer::new(5);
        let closed = Gates {
            playing: false,
            ..open()
        };
        assert!(!timer.start(&closed));
        assert_eq!(timer.phase(), TimerPhase::Idle);
        assert!(timer.start(&open()));
        assert!(!timer.start(&open()));
    }

    #[test]
    fn test_gated_ticks_do_not_count() {
        let mut timer = WatchTimer::new(5);
        timer.start(&open());
        assert_eq!(timer.tick(&open()), TickOutcome::Counted { accumulated: 1 });

        let unfocused = Gates {
            screen_focused: false,
            ..open()
        };
        for _ in 0..10 {
            assert_eq!(timer.tick(&unfocused), TickOutcome::Gated);
        }
        let held = Gates { held: true, ..open() };
        assert_eq!(timer.tick(&held), TickOutcome::Gated);
        assert_eq!(timer.accumulated(), 1);
        assert!(timer.is_running());

        assert_eq!(timer.tick(&open()), TickOutcome::Counted { accumulated: 2 });
    }

    #[test]
    fn test_completion_signalled_once() {
        let mut timer = WatchTimer::new(3);
        timer.start(&open());
        timer.tick(&open());
        timer.tick(&open());
        assert_eq!(timer.tick(&open()), TickOutcome::Completed { accumulated: 3 });
        assert_eq!(timer.tick(&open()), TickOutcome::Idle);
        assert!(!timer.start(&open()));
        assert_eq!(timer.accumulated(), 3);
        assert_eq!(timer.remaining(), 0);
    }

    #[test]
    fn test_zero_target_never_runs() {
        let mut timer = WatchTimer::new(0);
        assert!(timer.target_reached());
        assert!(!timer.start(&open()));
        assert_eq!(timer.tick(&open()), TickOutcome::Idle);
        assert_eq!(timer.accumulated(), 0);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut timer = WatchTimer::new(3);
        assert!(!timer.stop());
        timer.start(&open());
        assert!(timer.stop());
        assert!(!timer.stop());
        assert_eq!(timer.tick(&open()), TickOutcome::Idle);
    }

    #[test]
    fn test_zero_target_is_already_reached() {
        let timer = WatchTimer::new(0);
        assert!(timer.target_reached());
        assert_eq!(timer.remaining(), 0);
    }
}
