//! A one-shot timer for actor select loops.
//!
//! Created disarmed so "no timer pending" is an observable state; arming is
//! always an explicit reset at a state transition.

use std::future::{pending, Future};
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep_until, Instant, Sleep};

#[derive(Debug)]
pub struct ResettableTimer {
    sleep: Pin<Box<Sleep>>,
    armed: bool,
}

impl ResettableTimer {
    pub fn new() -> Self {
        Self {
            sleep: Box::pin(sleep_until(Instant::now())),
            armed: false,
        }
    }

    /// Start (or restart) the countdown.
    pub fn arm(&mut self, after: Duration) {
        self.sleep.as_mut().reset(Instant::now() + after);
        self.armed = true;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Completes when the armed countdown elapses; pends forever while
    /// disarmed. The timer disarms itself on firing.
    pub fn fired(&mut self) -> impl Future<Output = ()> + '_ {
        async move {
            if !self.armed {
                pending::<()>().await;
            }
            self.sleep.as_mut().await;
            self.armed = false;
        }
    }
}

impl Default for ResettableTimer {
    fn default() -> Self {
        Self::new()
    }
}
