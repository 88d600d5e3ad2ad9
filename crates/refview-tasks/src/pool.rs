// ThreadPool - fixed-size worker pool for deferred background work
//
// Workers run in dedicated OS threads and share one FIFO queue. Shutdown is
// cooperative: the quit flag is raised and workers stop between tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::TaskError;
use crate::task::{QuitSignal, Task};
use crate::worker::{Shared, run_worker};

/// Default interval at which idle workers re-check the quit flag.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Status snapshot of the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStatus {
    pub worker_count: usize,
    pub pending: usize,
    pub shut_down: bool,
}

/// Fixed-size pool of worker threads with a shared task queue.
///
/// # Example
///
/// ```rust,ignore
/// let pool = ThreadPool::new(QuitSignal::new());
/// pool.start(4)?;
/// pool.submit(Task::named("scan", || scan_directory()));
/// pool.shutdown();
/// ```
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    stopped: AtomicBool,
    joined: AtomicBool,
    poll_interval: Duration,
}

impl ThreadPool {
    /// Create a pool bound to the given quit signal. No threads are started.
    pub fn new(quit: QuitSignal) -> Self {
        Self {
            shared: Arc::new(Shared::new(quit)),
            workers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            joined: AtomicBool::new(false),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override how often idle workers re-check the quit flag.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The quit signal shared with the workers.
    pub fn quit_signal(&self) -> QuitSignal {
        self.shared.quit.clone()
    }

    /// Launch exactly `count` worker threads. May only be called once.
    pub fn start(&self, count: usize) -> Result<(), TaskError> {
        if count == 0 {
            return Err(TaskError::NoWorkers);
        }
        if self.shared.quit.is_set() {
            return Err(TaskError::ShutDown);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(TaskError::AlreadyStarted);
        }

        let mut workers = self.workers.lock();
        for id in 0..count {
            let shared = Arc::clone(&self.shared);
            let poll_interval = self.poll_interval;
            let handle = thread::Builder::new()
                .name(format!("refview-worker-{}", id))
                .spawn(move || run_worker(id, shared, poll_interval))?;
            workers.push(handle);
        }

        tracing::info!("ThreadPool started with {} workers", count);
        Ok(())
    }

    /// Enqueue a task for execution by any available worker.
    ///
    /// Tasks submitted after shutdown are accepted but never dequeued. Once
    /// the pool has been joined they are dropped on the spot.
    pub fn submit(&self, task: impl Into<Task>) {
        let task = task.into();
        let mut queue = self.shared.queue.lock();
        if self.joined.load(Ordering::SeqCst) {
            tracing::debug!("Task {} submitted after the pool was joined; dropped", task.name());
            return;
        }
        if self.shared.quit.is_set() {
            tracing::debug!("Task {} submitted after shutdown; it will not run", task.name());
        }
        queue.push_back(task);
        drop(queue);
        self.shared.available.notify_one();
    }

    /// Raise the quit flag and wake idle workers. Does not wait.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            tracing::debug!("ThreadPool shutdown already requested");
            return;
        }

        // Raise the flag under the queue lock so no worker can miss the wakeup
        // between its flag check and its wait.
        {
            let _queue = self.shared.queue.lock();
            self.shared.quit.set();
        }
        self.shared.available.notify_all();
        tracing::info!("ThreadPool shutdown requested");
    }

    /// Wait up to `timeout` for all workers to exit, then drop undrained tasks.
    ///
    /// Must be preceded by `shutdown()` (or the quit signal being raised
    /// elsewhere), otherwise workers never exit and this times out.
    pub fn join(&self, timeout: Duration) -> Result<(), TaskError> {
        let deadline = Instant::now() + timeout;
        let mut workers = self.workers.lock();

        {
            let mut exited = self.shared.exited.lock();
            while *exited < workers.len() {
                if self
                    .shared
                    .all_exited
                    .wait_until(&mut exited, deadline)
                    .timed_out()
                    && *exited < workers.len()
                {
                    return Err(TaskError::JoinTimeout(workers.len() - *exited));
                }
            }
        }

        for handle in workers.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("Worker thread terminated abnormally");
            }
        }

        let dropped = {
            let mut queue = self.shared.queue.lock();
            self.joined.store(true, Ordering::SeqCst);
            let n = queue.len();
            queue.clear();
            n
        };
        if dropped > 0 {
            tracing::debug!("Dropped {} undrained task(s) at shutdown", dropped);
        }

        Ok(())
    }

    /// Number of tasks waiting in the queue.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Number of worker threads launched.
    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.quit.is_set()
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            worker_count: self.worker_count(),
            pending: self.pending(),
            shut_down: self.is_shut_down(),
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        if !self.stopped.load(Ordering::SeqCst) && self.started.load(Ordering::SeqCst) {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    fn fast_pool() -> ThreadPool {
        ThreadPool::new(QuitSignal::new()).with_poll_interval(Duration::from_millis(5))
    }

    #[test]
    fn test_executes_submitted_tasks() {
        let pool = fast_pool();
        pool.start(4).unwrap();
        assert_eq!(pool.worker_count(), 4);

        let counter = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = mpsc::channel();
        for _ in 0..20 {
            let counter = counter.clone();
            let done_tx = done_tx.clone();
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = done_tx.send(());
            });
        }
        for _ in 0..20 {
            done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 20);

        pool.shutdown();
        pool.join(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_single_worker_preserves_ingress_order() {
        let pool = fast_pool();
        pool.start(1).unwrap();

        let (tx, rx) = mpsc::channel();
        for i in 0..10 {
            let tx = tx.clone();
            pool.submit(move || {
                let _ = tx.send(i);
            });
        }
        let seen: Vec<i32> = (0..10)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());

        pool.shutdown();
        pool.join(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_no_execution_after_shutdown() {
        let pool = fast_pool();
        pool.start(3).unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        pool.shutdown();
        pool.join(Duration::from_secs(5)).unwrap();
        let before = counter.load(Ordering::SeqCst);

        for _ in 0..10 {
            let counter = counter.clone();
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(pool.pending(), 0);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(counter.load(Ordering::SeqCst), before);
    }

    #[test]
    fn test_join_times_out_while_a_task_runs() {
        let pool = fast_pool();
        pool.start(1).unwrap();

        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        pool.submit(move || {
            let _ = started_tx.send(());
            let _ = release_rx.recv_timeout(Duration::from_secs(5));
        });
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        pool.shutdown();
        assert!(matches!(
            pool.join(Duration::from_millis(20)),
            Err(TaskError::JoinTimeout(1))
        ));

        release_tx.send(()).unwrap();
        pool.join(Duration::from_secs(5)).unwrap();
        assert_eq!(pool.worker_count(), 0);
        pool.join(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_submit_after_shutdown_without_join_never_runs() {
        let pool = fast_pool();
        pool.start(2).unwrap();
        pool.shutdown();

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let counter = counter.clone();
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        thread::sleep(Duration::from_millis(50));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        pool.join(Duration::from_secs(5)).unwrap();
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn test_in_flight_task_completes_after_shutdown() {
        let pool = fast_pool();
        pool.start(1).unwrap();

        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let finished = Arc::new(AtomicBool::new(false));
        let finished_clone = finished.clone();

        pool.submit(move || {
            let _ = started_tx.send(());
            let _ = release_rx.recv_timeout(Duration::from_secs(5));
            finished_clone.store(true, Ordering::SeqCst);
        });

        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        pool.shutdown();
        release_tx.send(()).unwrap();

        pool.join(Duration::from_secs(5)).unwrap();
        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn test_panicking_task_does_not_kill_worker() {
        let pool = fast_pool();
        pool.start(1).unwrap();

        pool.submit(Task::named("explodes", || panic!("boom")));

        let (tx, rx) = mpsc::channel();
        pool.submit(move || {
            let _ = tx.send(42);
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);

        pool.shutdown();
        pool.join(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_start_twice_fails() {
        let pool = fast_pool();
        pool.start(1).unwrap();
        assert!(matches!(pool.start(1), Err(TaskError::AlreadyStarted)));
        pool.shutdown();
        pool.join(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_start_zero_workers_fails() {
        let pool = fast_pool();
        assert!(matches!(pool.start(0), Err(TaskError::NoWorkers)));
    }

    #[test]
    fn test_external_quit_stops_workers() {
        let quit = QuitSignal::new();
        let pool = ThreadPool::new(quit.clone()).with_poll_interval(Duration::from_millis(5));
        pool.start(2).unwrap();

        // Raised by someone other than the pool, e.g. the event loop
        quit.set();
        pool.join(Duration::from_secs(5)).unwrap();
        assert!(pool.status().shut_down);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let pool = fast_pool();
        pool.start(1).unwrap();
        pool.shutdown();
        pool.shutdown();
        pool.join(Duration::from_secs(5)).unwrap();
        assert!(pool.is_shut_down());
    }
}
