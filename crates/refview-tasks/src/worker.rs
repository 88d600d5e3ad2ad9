//! Worker thread loop.
//!
//! Each worker pulls tasks from the shared queue until the quit signal is
//! observed. The flag is checked under the queue lock immediately before
//! every dequeue, so a worker that has seen it never starts another task.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::task::{QuitSignal, Task};

/// State shared between the pool handle and its workers.
pub(crate) struct Shared {
    pub(crate) queue: Mutex<VecDeque<Task>>,
    pub(crate) available: Condvar,
    pub(crate) quit: QuitSignal,
    /// Number of workers that have left their loop
    pub(crate) exited: Mutex<usize>,
    pub(crate) all_exited: Condvar,
}

impl Shared {
    pub(crate) fn new(quit: QuitSignal) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            quit,
            exited: Mutex::new(0),
            all_exited: Condvar::new(),
        }
    }

    /// Block until a task is available or the quit flag is raised.
    ///
    /// The bounded wait covers quit flags raised by someone other than the
    /// pool (for example the event loop on Ctrl+C), which never notify.
    fn next_task(&self, poll_interval: Duration) -> Option<Task> {
        let mut queue = self.queue.lock();
        loop {
            if self.quit.is_set() {
                return None;
            }
            if let Some(task) = queue.pop_front() {
                return Some(task);
            }
            self.available.wait_for(&mut queue, poll_interval);
        }
    }
}

/// Counts the worker as exited however its loop ends.
struct ExitGuard<'a>(&'a Shared);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        *self.0.exited.lock() += 1;
        self.0.all_exited.notify_all();
    }
}

/// The main loop that runs inside each spawned worker thread.
pub(crate) fn run_worker(id: usize, shared: Arc<Shared>, poll_interval: Duration) {
    tracing::debug!("[worker:{}] Started", id);
    let _exit = ExitGuard(&shared);

    while let Some(task) = shared.next_task(poll_interval) {
        let name = task.name().to_string();
        tracing::trace!("[worker:{}] Running task {}", id, name);

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || task.run())) {
            tracing::error!(
                "[worker:{}] Task {} panicked: {}",
                id,
                name,
                panic_message(payload.as_ref())
            );
        }
    }

    tracing::debug!("[worker:{}] Quit signal observed, exiting", id);
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic payload"
    }
}
