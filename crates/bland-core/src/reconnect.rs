use std::time::Duration;

/// Maximum number of automatic reconnection attempts before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Base delay between reconnection attempts in ms (doubles each attempt).
pub const RECONNECT_BASE_DELAY_MS: u64 = 1_000;

/// Upper bound on a single reconnection delay in ms.
pub const RECONNECT_MAX_DELAY_MS: u64 = 10_000;

/// What to do after the connection dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    Retry { delay: Duration },
    GiveUp,
}

/// Exponential backoff with a fixed attempt budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectionPolicy {
    base_delay_ms: u64,
    max_delay_ms: u64,
    max_attempts: u32,
}

impl ReconnectionPolicy {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64, max_attempts: u32) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            max_attempts,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.min(20);
        let calculated = self.base_delay_ms.saturating_mul(1_u64 << shift);
        Duration::from_millis(calculated.min(self.max_delay_ms))
    }

    /// Decide based on how many attempts were already made.
    pub fn decide(&self, attempts_made: u32) -> ReconnectDecision {
        if attempts_made >= self.max_attempts {
            ReconnectDecision::GiveUp
        } else {
            ReconnectDecision::Retry {
                delay: self.delay_for_attempt(attempts_made),
            }
        }
    }
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self::new(
            RECONNECT_BASE_DELAY_MS,
            RECONNECT_MAX_DELAY_MS,
            MAX_RECONNECT_ATTEMPTS,
        )
    }
}

/// Attempts made since the last successful open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectAttemptState {
    attempt_count: u32,
    max_attempts: u32,
}

impl ReconnectAttemptState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt_count: 0,
            max_attempts,
        }
    }

    pub fn count(&self) -> u32 {
        self.attempt_count
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }

    /// Count one more attempt, saturating at the budget.
    pub fn record_attempt(&mut self) -> u32 {
        self.attempt_count = (self.attempt_count + 1).min(self.max_attempts);
        self.attempt_count
    }

    pub fn reset(&mut self) {
        self.attempt_count = 0;
    }
}

impl Default for ReconnectAttemptState {
    fn default() -> Self {
        Self::new(MAX_RECONNECT_ATTEMPTS)
    }
}
