//! Countdown driven by an external one-second tick.
//!
//! The controller never reads a clock. The runtime calls [`TimerController::tick`]
//! once per second; the server may overwrite the remaining time at any moment
//! with [`TimerController::resync`].

/// Observable countdown value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerState {
    pub remaining_seconds: u32,
    pub expired: bool,
}

/// Result of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// No countdown is running.
    Idle,
    /// The countdown moved; `remaining` is the new value.
    Running { remaining: u32 },
    /// The countdown reached zero on this tick. Reported exactly once.
    Expired,
}

/// A single countdown. Starting a new one replaces the running one.
#[derive(Debug, Clone, Default)]
pub struct TimerController {
    state: TimerState,
    running: bool,
    /// Bumped by every [`start`](Self::start); lets the runtime realign its
    /// tick cadence to a fresh countdown.
    epoch: u64,
}

impl TimerController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a countdown of `seconds`, cancelling any running one.
    pub fn start(&mut self, seconds: u32) {
        self.state = TimerState {
            remaining_seconds: seconds,
            expired: false,
        };
        self.running = true;
        self.epoch += 1;
        tracing::debug!(seconds, "countdown started");
    }

    /// Overwrite the remaining time from an authoritative value.
    ///
    /// Keeps the running/stopped state and the tick alignment untouched.
    pub fn resync(&mut self, remaining: u32) {
        self.state.remaining_seconds = remaining;
        tracing::debug!(remaining, "countdown resynced");
    }

    /// Stop the countdown without firing expiry. No-op when idle.
    pub fn cancel(&mut self) {
        self.running = false;
    }

    /// Stop the countdown and drop the value it showed.
    pub fn clear(&mut self) {
        self.running = false;
        self.state = TimerState::default();
    }

    /// Advance the countdown by one second.
    pub fn tick(&mut self) -> Tick {
        if !self.running {
            return Tick::Idle;
        }
        self.state.remaining_seconds = self.state.remaining_seconds.saturating_sub(1);
        if self.state.remaining_seconds == 0 {
            self.running = false;
            self.state.expired = true;
            return Tick::Expired;
        }
        Tick::Running {
            remaining: self.state.remaining_seconds,
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn remaining(&self) -> u32 {
        self.state.remaining_seconds
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}
