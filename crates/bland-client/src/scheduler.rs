//! [`Scheduler`] backed by tokio timers.
//!
//! Each wake-up is a spawned sleep that delivers its token on a channel
//! unless the handle was cancelled first. Late deliveries are harmless: the
//! session ignores tokens it no longer waits for.

use std::time::Duration;

use bland_core::schedule::{Scheduler, TimerHandle, TimerToken};
use tokio::sync::mpsc;

pub struct TokioScheduler {
    next: u64,
    wakes: mpsc::UnboundedSender<TimerToken>,
}

impl TokioScheduler {
    pub fn new(wakes: mpsc::UnboundedSender<TimerToken>) -> Self {
        Self { next: 0, wakes }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, delay: Duration) -> TimerHandle {
        self.next += 1;
        let handle = TimerHandle::new(TimerToken(self.next));
        let watch = handle.clone();
        let wakes = self.wakes.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !watch.is_cancelled() {
                let _ = wakes.send(watch.token());
            }
        });
        handle
    }
}
