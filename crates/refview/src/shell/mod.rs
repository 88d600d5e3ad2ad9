// Shell - startup orchestration, the UI hand-off queue and config hooks

pub mod controller;
pub mod event_loop;
pub mod hooks;
pub mod report;
pub mod state;

pub use controller::{DEFAULT_POLL, DEFAULT_WORKERS, ShellBuilder, ShellController, StartupPlan};
pub use event_loop::{
    EventQueue, UiCallback, UiHandle, shutdown_signal, ui_channel, watch_interrupt,
};
pub use hooks::{ConfigHook, HookPoint};
pub use report::{Outcome, Phase, StartupEntry, StartupReport};
pub use state::{ShellState, StateError, StateMachine};
