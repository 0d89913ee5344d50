//! Cancellable delayed wake-ups.
//!
//! Every deferred callback the session relies on (reconnect backoff) goes
//! through a [`Scheduler`]. The returned [`TimerHandle`] can be cancelled, and
//! the wake-up carries a [`TimerToken`] so a late delivery from an older
//! schedule is recognised and ignored.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Identifies one scheduled wake-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(pub u64);

/// Handle to a scheduled wake-up. Clones share the cancellation flag.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    token: TimerToken,
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    pub fn new(token: TimerToken) -> Self {
        Self {
            token,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn token(&self) -> TimerToken {
        self.token
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Whether a wake-up carrying `token` belongs to this live handle.
    pub fn matches(&self, token: TimerToken) -> bool {
        self.token == token && !self.is_cancelled()
    }
}

/// Something that can deliver a [`TimerToken`] back to the session after a
/// delay.
pub trait Scheduler {
    /// Arrange for `token` of the returned handle to be delivered after
    /// `delay`, unless the handle is cancelled first.
    fn schedule(&mut self, delay: Duration) -> TimerHandle;
}
