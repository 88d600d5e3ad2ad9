// Plugin API - the trait every plugin implements and the context it receives
//
// Plugins run on the event-loop thread. Long work goes to the task pool and
// results come back through the UI handle.

use std::fmt;
use std::sync::Arc;

use refview_tasks::ThreadPool;

use crate::channel::Channel;
use crate::shell::UiHandle;
use crate::types::Result;

use super::descriptor::{PluginDescriptor, PluginType};

// ─────────────────────────────────────────────────────────────────────────────
// Plugin Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A started plugin instance.
pub trait Plugin: Send {
    /// Called once when the shell starts the plugin.
    fn start(&mut self, ctx: PluginContext) -> Result<()>;

    /// Called once when the plugin is stopped or the shell shuts down.
    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    /// The active channel changed.
    fn channel_changed(&mut self, _channel: &Channel) {}
}

/// Builds a plugin instance from its descriptor.
pub type PluginConstructor =
    Arc<dyn Fn(&PluginDescriptor) -> Result<Box<dyn Plugin>> + Send + Sync>;

/// Wrap a closure as a [`PluginConstructor`].
pub fn constructor<F>(func: F) -> PluginConstructor
where
    F: Fn(&PluginDescriptor) -> Result<Box<dyn Plugin>> + Send + Sync + 'static,
{
    Arc::new(func)
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugin Context
// ─────────────────────────────────────────────────────────────────────────────

/// What a plugin gets from the shell when it starts.
#[derive(Clone)]
pub struct PluginContext {
    pub name: String,
    pub ptype: PluginType,
    /// Workspace the plugin's view was placed in
    pub workspace: String,
    /// Owning channel, for local plugins
    pub channel: Option<String>,
    pub tasks: Arc<ThreadPool>,
    pub ui: UiHandle,
}

impl fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginContext")
            .field("name", &self.name)
            .field("ptype", &self.ptype)
            .field("workspace", &self.workspace)
            .field("channel", &self.channel)
            .finish()
    }
}
