//! CPU-visible fence counter

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

#[derive(Debug, Default)]
struct FenceState {
    completed: Mutex<u64>,
    signaled: Condvar,
    waiters: AtomicUsize,
}

/// Monotonic completed-work counter shared between the GPU timeline and the CPU
///
/// Clones share the same counter, so one side can complete values while the
/// other blocks in [`FenceTimeline::wait_for`].
#[derive(Debug, Clone, Default)]
pub struct FenceTimeline {
    state: Arc<FenceState>,
}

impl FenceTimeline {
    /// Create a timeline with nothing completed
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest completed value
    pub fn completed(&self) -> u64 {
        *self.state.completed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark all work up to `value` complete and wake waiters
    ///
    /// Values lower than the current one are ignored; the counter never goes back.
    pub fn complete(&self, value: u64) {
        let mut completed = self.state.completed.lock().unwrap_or_else(PoisonError::into_inner);
        if value > *completed {
            *completed = value;
            self.state.signaled.notify_all();
        }
    }

    /// Block until the completed value reaches `value`
    pub fn wait_for(&self, value: u64) {
        let mut completed = self.state.completed.lock().unwrap_or_else(PoisonError::into_inner);
        if *completed >= value {
            return;
        }

        self.state.waiters.fetch_add(1, Ordering::SeqCst);
        while *completed < value {
            completed = self
                .state
                .signaled
                .wait(completed)
                .unwrap_or_else(PoisonError::into_inner);
        }
        self.state.waiters.fetch_sub(1, Ordering::SeqCst);
    }

    /// Number of threads currently blocked in [`FenceTimeline::wait_for`]
    pub fn waiters(&self) -> usize {
        self.state.waiters.load(Ordering::SeqCst)
    }
}
