//! Read-through toggles
//!
//! Long-lived callbacks (hover bindings, recognition handlers, restart timers)
//! hold a [`LiveFlag`] rather than a captured `bool`, so every read observes
//! the value at call time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared boolean cell that is read at call time
#[derive(Debug, Clone, Default)]
pub struct LiveFlag(Arc<AtomicBool>);

impl LiveFlag {
    pub fn new(value: bool) -> Self {
        Self(Arc::new(AtomicBool::new(value)))
    }

    /// Current value
    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Store a new value, returning the previous one
    pub fn set(&self, value: bool) -> bool {
        self.0.swap(value, Ordering::SeqCst)
    }

    /// Flip the value, returning the new one
    pub fn toggle(&self) -> bool {
        !self.0.fetch_xor(true, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let flag = LiveFlag::new(false);
        let observer = flag.clone();

        assert!(!flag.set(true));
        assert!(observer.get());

        assert!(!observer.toggle());
        assert!(!flag.get());
    }

    #[test]
    fn test_closure_reads_current_value() {
        let flag = LiveFlag::new(true);
        let reader = {
            let flag = flag.clone();
            move || flag.get()
        };

        assert!(reader());
        flag.set(false);
        assert!(!reader());
    }
}
