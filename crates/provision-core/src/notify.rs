//! Single-permit readiness signal between the config service and the
//! control thread.
//!
//! Signalling sets the permit; waiting consumes it, blocking until one is
//! available. Signals beyond the first collapse into one permit.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct NotificationChannel {
    permit: Mutex<bool>,
    ready: Condvar,
}

impl NotificationChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the permit available and wake the waiter, if any.
    pub fn signal(&self) {
        *self.lock() = true;
        self.ready.notify_one();
    }

    /// Block until the permit is available, then consume it. No timeout.
    pub fn wait(&self) {
        let mut permit = self.lock();
        while !*permit {
            permit = self
                .ready
                .wait(permit)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *permit = false;
    }

    /// Whether a permit is waiting to be consumed.
    pub fn is_signalled(&self) -> bool {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.permit.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
