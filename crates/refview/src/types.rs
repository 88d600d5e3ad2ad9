use refview_tasks::TaskError;

use crate::channel::ChannelError;
use crate::config::SettingsError;
use crate::layout::LayoutError;
use crate::plugin::LoadError;
use crate::shell::StateError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Toolkit error: {0}")]
    Toolkit(String),

    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error("Plugin load error: {0}")]
    Load(#[from] LoadError),

    #[error("Plugin error: {0}")]
    Plugin(String),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Task pool error: {0}")]
    Task(#[from] TaskError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Other: {0}")]
    Other(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
