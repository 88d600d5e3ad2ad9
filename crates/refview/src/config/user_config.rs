// User Config - the `config.toml` hook file
//
// Each table runs at one startup hook point:
//
//   [before_ui]       before the layout is built
//   [after_ui]        after the layout, before plugins boot
//   [after_channels]  after the initial channels exist
//
// and may add plugins, disable plugins, add channels and pick the channel to
// activate.

use std::path::Path;

use serde::Deserialize;

use crate::plugin::{PluginDescriptor, PluginSource};
use crate::shell::{ConfigHook, ShellController};
use crate::types::Result;

use super::settings::SettingsError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HookActions {
    pub plugins: Vec<PluginDescriptor>,
    pub disable: Vec<String>,
    pub channels: Vec<String>,
    pub activate: Option<String>,
}

impl HookActions {
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
            && self.disable.is_empty()
            && self.channels.is_empty()
            && self.activate.is_none()
    }

    fn apply(&self, shell: &mut ShellController) -> Result<()> {
        for desc in &self.plugins {
            shell.register_plugin(desc.clone(), PluginSource::ConfigHook);
        }
        if !self.disable.is_empty() {
            shell.disable_plugins(&self.disable);
        }
        for name in &self.channels {
            shell.add_channel(name)?;
        }
        if let Some(name) = &self.activate {
            shell.change_channel(name)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub before_ui: HookActions,
    pub after_ui: HookActions,
    pub after_channels: HookActions,
}

impl UserConfig {
    /// Load the hook file; `Ok(None)` when there is none.
    pub fn load(path: &Path) -> std::result::Result<Option<Self>, SettingsError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config = toml::from_str(&content).map_err(|e| SettingsError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(config))
    }
}

impl ConfigHook for UserConfig {
    fn name(&self) -> &str {
        "config.toml"
    }

    fn before_ui(&self, shell: &mut ShellController) -> Result<()> {
        self.before_ui.apply(shell)
    }

    fn after_ui(&self, shell: &mut ShellController) -> Result<()> {
        self.after_ui.apply(shell)
    }

    fn after_channels(&self, shell: &mut ShellController) -> Result<()> {
        self.after_channels.apply(shell)
    }
}
