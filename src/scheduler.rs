//! The scheduling contract platforms expose to application code.

use std::time::Duration;

/// A unit of work handed to a scheduler.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Capability to enqueue work for asynchronous execution on the host
/// runtime's execution model.
///
/// How tasks actually run — timer-based, loop-based, or thread-pool-based —
/// is opaque to callers. Implementations must be thread-safe; `schedule` may
/// be called from any thread.
///
/// # Ordering
///
/// Tasks submitted through [`schedule`](Scheduler::schedule) on the same
/// scheduler run in FIFO order relative to each other. No ordering is
/// guaranteed relative to other schedulers, or relative to tasks submitted
/// through [`schedule_after`](Scheduler::schedule_after).
pub trait Scheduler: Send + Sync {
    /// Enqueues `task` for asynchronous execution.
    ///
    /// Returns without waiting for the task to run.
    fn schedule(&self, task: Task);

    /// Runs `task` after at least `delay` has elapsed.
    ///
    /// The delay is a lower bound; host-runtime timer resolution applies.
    fn schedule_after(&self, delay: Duration, task: Task);
}
