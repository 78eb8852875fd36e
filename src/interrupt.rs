//! Cooperative interruption shared between a caller and a running scan or cleanup

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Advisory stop flag
///
/// Triggering never preempts an in-flight request; the collector and cleaner
/// check it before starting the next page or thread.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Returns true if the flag was already set.
    pub fn trigger(&self) -> bool {
        self.flag.swap(true, Ordering::SeqCst)
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
