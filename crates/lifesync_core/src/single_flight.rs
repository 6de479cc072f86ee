//! Single-flight guard for flush and sync cycles.
//!
//! # Invariants
//! - At most one guard per `SingleFlight` exists at any time.
//! - Dropping the guard (including during unwinding) releases the flight.

use std::sync::atomic::{AtomicBool, Ordering};

/// Atomic "in progress" flag shared by overlapping triggers.
#[derive(Debug, Default)]
pub struct SingleFlight {
    busy: AtomicBool,
}

impl SingleFlight {
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
        }
    }

    /// Returns a guard when no other flight is running, `None` otherwise.
    pub fn try_acquire(&self) -> Option<SingleFlightGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SingleFlightGuard { busy: &self.busy })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct SingleFlightGuard<'a> {
    busy: &'a AtomicBool,
}

impl Drop for SingleFlightGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
