//! Error types for the worker pool.

/// Errors that can occur while managing the pool.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Thread pool has already been started")]
    AlreadyStarted,

    #[error("Thread pool has been shut down")]
    ShutDown,

    #[error("Worker count must be at least 1")]
    NoWorkers,

    #[error("Failed to spawn worker thread: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("Timed out waiting for {0} worker(s) to exit")]
    JoinTimeout(usize),
}
