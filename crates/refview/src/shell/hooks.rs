// Config Hooks - user code run at fixed points during startup
//
// Every method has a no-op default, so a hook only implements the points it
// cares about. Each call is isolated: an error or panic is logged and
// startup continues.

use std::fmt;

use crate::types::Result;

use super::controller::ShellController;

pub trait ConfigHook {
    /// Name used in log lines and the startup report
    fn name(&self) -> &str {
        "config hook"
    }

    /// Before the layout is built. Plugins registered here take part in the
    /// normal resolve step.
    fn before_ui(&self, _shell: &mut ShellController) -> Result<()> {
        Ok(())
    }

    /// After the layout is built, before plugins are placed and booted.
    fn after_ui(&self, _shell: &mut ShellController) -> Result<()> {
        Ok(())
    }

    /// After the initial channels exist and one is active.
    fn after_channels(&self, _shell: &mut ShellController) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    BeforeUi,
    AfterUi,
    AfterChannels,
}

impl HookPoint {
    pub(crate) fn run(self, hook: &dyn ConfigHook, shell: &mut ShellController) -> Result<()> {
        match self {
            HookPoint::BeforeUi => hook.before_ui(shell),
            HookPoint::AfterUi => hook.after_ui(shell),
            HookPoint::AfterChannels => hook.after_channels(shell),
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HookPoint::BeforeUi => "before_ui",
            HookPoint::AfterUi => "after_ui",
            HookPoint::AfterChannels => "after_channels",
        };
        f.write_str(label)
    }
}
