//! Thread-backed scheduler for the native platform.

use std::sync::mpsc::{self, Sender};
use std::time::Duration;

use crate::scheduler::{Scheduler, Task};

/// Runs tasks on one dedicated worker thread.
///
/// Tasks submitted with [`schedule`](Scheduler::schedule) run in submission
/// order on the worker. [`schedule_after`](Scheduler::schedule_after) parks a
/// short-lived timer thread and re-enqueues onto the same worker, so delayed
/// tasks share the worker's ordering once due.
///
/// The worker lives until every handle to the scheduler is dropped, then
/// drains and exits. A task that panics takes the worker down with it;
/// treat that as a bug in the task, not a recoverable condition.
pub struct NativeScheduler {
    sender: Sender<Task>,
}

impl NativeScheduler {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel::<Task>();
        std::thread::Builder::new()
            .name("underlay::scheduler".to_string())
            .spawn(move || {
                while let Ok(task) = receiver.recv() {
                    task();
                }
                // all senders dropped; nothing more can arrive
            })
            .expect("failed to spawn scheduler worker");
        NativeScheduler { sender }
    }
}

impl Default for NativeScheduler {
    fn default() -> Self {
        NativeScheduler::new()
    }
}

impl Scheduler for NativeScheduler {
    fn schedule(&self, task: Task) {
        // a dead worker means the process is tearing down; dropping the task
        // is the only sensible outcome
        let _ = self.sender.send(task);
    }

    fn schedule_after(&self, delay: Duration, task: Task) {
        let sender = self.sender.clone();
        std::thread::Builder::new()
            .name("underlay::scheduler-timer".to_string())
            .spawn(move || {
                std::thread::sleep(delay);
                let _ = sender.send(task);
            })
            .expect("failed to spawn scheduler timer");
    }
}
