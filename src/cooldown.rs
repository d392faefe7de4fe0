//! Command cooldown gate
//!
//! After a command executes, results arriving within the window are dropped.
//! A single gate is shared by every recognition mode.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct CommandCooldown {
    window: Duration,
    last_command: Mutex<Option<Instant>>,
}

impl CommandCooldown {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_command: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether a command ran less than `window` ago
    pub fn is_cooling_down(&self) -> bool {
        self.last_command
            .lock()
            .is_some_and(|at| at.elapsed() < self.window)
    }

    /// Check and mark in one step; false while cooling down
    pub fn try_acquire(&self) -> bool {
        let mut last = self.last_command.lock();
        if last.is_some_and(|at| at.elapsed() < self.window) {
            return false;
        }
        *last = Some(Instant::now());
        true
    }
}
