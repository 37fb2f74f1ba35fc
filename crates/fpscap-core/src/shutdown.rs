use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// A stop signal that supports interruptible waits.
///
/// The module-wait loop, the remote pointer spin and the patch loop all sleep
/// between attempts; waits on this signal are cut short the moment the signal
/// is triggered instead of running out their full delay.
pub struct StopSignal {
    triggered: AtomicBool,
    condvar: Condvar,
    mutex: Mutex<()>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            triggered: AtomicBool::new(false),
            condvar: Condvar::new(),
            mutex: Mutex::new(()),
        }
    }

    /// Trigger the signal, waking all waiting threads.
    pub fn trigger(&self) {
        // Holding the mutex orders the store against a waiter that has
        // checked the flag but not yet blocked on the condvar.
        let _guard = self.mutex.lock();
        self.triggered.store(true, Ordering::SeqCst);
        self.condvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Wait for the given duration or until the signal is triggered.
    ///
    /// Returns `true` if the signal was triggered, `false` if the wait
    /// completed normally.
    pub fn wait(&self, duration: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }

        let guard = match self.mutex.lock() {
            Ok(g) => g,
            // Poisoned mutex, treat as triggered
            Err(_) => return true,
        };

        match self
            .condvar
            .wait_timeout_while(guard, duration, |_| !self.is_triggered())
        {
            Ok((_, timeout_result)) => !timeout_result.timed_out(),
            Err(_) => true,
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}
