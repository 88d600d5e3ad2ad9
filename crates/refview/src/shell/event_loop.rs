//! UI hand-off queue
//!
//! Worker threads never touch UI state. They send closures through a
//! [`UiHandle`] and the event loop runs them, one at a time, on its own
//! thread.

use std::future::Future;

use refview_tasks::QuitSignal;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::controller::ShellController;

/// Work to run on the event-loop thread
pub type UiCallback = Box<dyn FnOnce(&mut ShellController) + Send>;

/// Cloneable sender side of the hand-off queue.
#[derive(Clone)]
pub struct UiHandle {
    tx: mpsc::UnboundedSender<UiCallback>,
    quit: QuitSignal,
}

impl UiHandle {
    /// Run `func` on the event-loop thread. Returns false once the loop is
    /// gone.
    pub fn gui_do<F>(&self, func: F) -> bool
    where
        F: FnOnce(&mut ShellController) + Send + 'static,
    {
        self.tx.send(Box::new(func)).is_ok()
    }

    /// Ask the event loop to stop.
    pub fn quit(&self) {
        if self.quit.set() {
            tracing::debug!("Quit requested");
        }
        // Wake the loop so it notices the flag right away
        let _ = self.tx.send(Box::new(|_| {}));
    }

    pub fn quit_signal(&self) -> QuitSignal {
        self.quit.clone()
    }
}

impl std::fmt::Debug for UiHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiHandle")
            .field("quit", &self.quit.is_set())
            .finish()
    }
}

/// Receiver side, owned by the controller.
pub struct EventQueue {
    rx: mpsc::UnboundedReceiver<UiCallback>,
}

impl EventQueue {
    pub async fn recv(&mut self) -> Option<UiCallback> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<UiCallback> {
        self.rx.try_recv().ok()
    }
}

pub fn ui_channel(quit: QuitSignal) -> (UiHandle, EventQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UiHandle { tx, quit }, EventQueue { rx })
}

/// Quit the shell once `signal` resolves.
///
/// The watcher runs on the runtime's worker threads, so it also fires while
/// the caller is busy in the synchronous startup sequence.
pub fn watch_interrupt<F>(runtime: &Handle, signal: F, ui: UiHandle) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    runtime.spawn(async move {
        signal.await;
        ui.quit();
    })
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::error!("Received keyboard interrupt!");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, shutting down...");
        },
    }
}
