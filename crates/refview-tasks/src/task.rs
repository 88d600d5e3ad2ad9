//! Units of deferred work and the shared quit signal.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

type TaskFn = Box<dyn FnOnce() + Send + 'static>;

/// A deferred unit of work executed by a pool worker.
///
/// Tasks have no return channel. A task that produces something the UI needs
/// must hand it back through its own means (see `UiHandle` in the shell).
pub struct Task {
    name: Option<String>,
    func: TaskFn,
}

impl Task {
    /// Wrap a closure as an anonymous task.
    pub fn new<F>(func: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            name: None,
            func: Box::new(func),
        }
    }

    /// Wrap a closure as a task with a name used in log lines.
    pub fn named<F>(name: impl Into<String>, func: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            name: Some(name.into()),
            func: Box::new(func),
        }
    }

    /// Name of the task, or `"<anonymous>"`.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }

    pub(crate) fn run(self) {
        (self.func)()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("name", &self.name()).finish()
    }
}

impl<F> From<F> for Task
where
    F: FnOnce() + Send + 'static,
{
    fn from(func: F) -> Self {
        Task::new(func)
    }
}

/// Cooperative cancellation flag shared by the pool and the event loop.
///
/// Cloning yields another handle to the same flag. Once set it stays set.
#[derive(Debug, Clone, Default)]
pub struct QuitSignal(Arc<AtomicBool>);

impl QuitSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Returns `true` if this call was the one that set it.
    pub fn set(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
