//! Sleep-based pacing: fixed cooldown windows and injectable sleepers.

use std::cell::RefCell;
use std::time::Duration;

/// Blocks the calling thread. Injected so batch logic can be tested without waiting.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps for real.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Records requested sleeps and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every duration requested so far, in order.
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.borrow().clone()
    }

    /// How many sleeps of exactly `duration` were requested.
    pub fn count(&self, duration: Duration) -> usize {
        self.slept.borrow().iter().filter(|d| **d == duration).count()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.borrow_mut().push(duration);
    }
}

/// Fixed-window rate limiter: a cooldown after every `window` items of a pass,
/// never after the pass's last item.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    pub window: usize,
    pub cooldown: Duration,
}

impl Pacer {
    pub fn new(window: usize, cooldown: Duration) -> Self {
        Self { window, cooldown }
    }

    /// Whether a cooldown follows item `processed` (1-based) of a pass of `total` items.
    pub fn cooldown_due(&self, processed: usize, total: usize) -> bool {
        self.window > 0 && processed % self.window == 0 && processed < total
    }

    /// Sleep the cooldown if one is due. Returns whether it slept.
    pub fn after_item(&self, processed: usize, total: usize, sleeper: &dyn Sleeper) -> bool {
        if !self.cooldown_due(processed, total) {
            return false;
        }
        tracing::info!(
            processed,
            total,
            secs = self.cooldown.as_secs_f64(),
            "cooling down"
        );
        sleeper.sleep(self.cooldown);
        true
    }
}
