//! Refview Task Pool
//!
//! Bounded background-task execution for the viewer shell. The event loop
//! and plugins submit [`Task`]s; a fixed set of OS threads drains them.
//!
//! # Architecture
//!
//! - One FIFO queue shared by all workers (queue-ingress order only)
//! - One [`QuitSignal`] shared with the event loop
//! - Cooperative shutdown: in-flight tasks finish, nothing new starts
//! - Workers never touch UI state; results go back through the shell's
//!   hand-off queue

mod error;
mod pool;
mod task;
mod worker;

pub use error::TaskError;
pub use pool::{DEFAULT_POLL_INTERVAL, PoolStatus, ThreadPool};
pub use task::{QuitSignal, Task};
