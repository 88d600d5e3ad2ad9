//! Plugin descriptors
//!
//! A descriptor says which plugin to load, what kind it is, and where its
//! view goes. It carries no behavior of its own.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Global plugins are singletons; local plugins get one instance per channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    Global,
    #[default]
    Local,
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginType::Global => write!(f, "global"),
            PluginType::Local => write!(f, "local"),
        }
    }
}

/// Declarative description of a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub module: String,
    #[serde(default)]
    pub ptype: PluginType,
    /// Name of the target workspace; empty means "place by group"
    #[serde(default)]
    pub workspace: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu: Option<String>,
    /// Start at boot (global plugins only)
    #[serde(default)]
    pub start: bool,
    /// Keep out of menus and the operations list
    #[serde(default)]
    pub hidden: bool,
    /// Dotted qualifier separating same-named plugins from different providers
    #[serde(default, alias = "pfx", skip_serializing_if = "Option::is_none")]
    pub namespace_prefix: Option<String>,
    /// Explicit manifest to load instead of searching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Constructor name to use instead of `module`
    #[serde(default, alias = "class", skip_serializing_if = "Option::is_none")]
    pub class_override: Option<String>,
    /// Workspace compatibility class for fallback placement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<u32>,
}

fn default_category() -> String {
    "Custom".to_string()
}

impl PluginDescriptor {
    pub fn new(module: impl Into<String>, ptype: PluginType, workspace: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            ptype,
            workspace: workspace.into(),
            category: default_category(),
            tab: None,
            menu: None,
            start: false,
            hidden: false,
            namespace_prefix: None,
            path: None,
            class_override: None,
            group: None,
        }
    }

    pub fn global(module: impl Into<String>, workspace: impl Into<String>) -> Self {
        Self::new(module, PluginType::Global, workspace)
    }

    pub fn local(module: impl Into<String>, workspace: impl Into<String>) -> Self {
        Self::new(module, PluginType::Local, workspace)
    }

    /// Build a descriptor from a plugin name given on the command line or in
    /// saved settings. `acme.tools.Cuts` splits into prefix `acme.tools` and
    /// module `Cuts`.
    pub fn from_long_name(long_name: &str, ptype: PluginType) -> Self {
        let (prefix, module) = split_plugin_name(long_name);
        let desc = match ptype {
            PluginType::Global => Self::global(&module, "right")
                .with_tab(&module)
                .with_menu(format!("{} [G]", module))
                .with_start(true),
            PluginType::Local => Self::local(&module, "dialogs"),
        };
        match prefix {
            Some(prefix) => desc.with_prefix(prefix),
            None => desc,
        }
    }

    pub fn with_tab(mut self, tab: impl Into<String>) -> Self {
        self.tab = Some(tab.into());
        self
    }

    pub fn with_menu(mut self, menu: impl Into<String>) -> Self {
        self.menu = Some(menu.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_start(mut self, start: bool) -> Self {
        self.start = start;
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.namespace_prefix = Some(prefix.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class_override = Some(class.into());
        self
    }

    pub fn with_group(mut self, group: u32) -> Self {
        self.group = Some(group);
        self
    }

    /// The name the shell knows this plugin by.
    pub fn name(&self) -> &str {
        self.class_override.as_deref().unwrap_or(&self.module)
    }

    /// Key used to look up a constructor: the name, qualified by the prefix.
    pub fn lookup_key(&self) -> String {
        qualify(self.namespace_prefix.as_deref(), self.name())
    }

    /// Label shown on the plugin's tab.
    pub fn tab_label(&self) -> &str {
        self.tab.as_deref().unwrap_or_else(|| self.name())
    }

    /// Label shown in the plugin menu.
    pub fn menu_label(&self) -> &str {
        self.menu.as_deref().unwrap_or_else(|| self.name())
    }

    /// Whether the plugin is started at boot.
    pub fn starts_at_boot(&self) -> bool {
        self.ptype == PluginType::Global && self.start
    }

    pub fn identity(&self) -> PluginIdentity {
        PluginIdentity {
            prefix: self.namespace_prefix.clone(),
            module: self.module.clone(),
            ptype: self.ptype,
            workspace: self.workspace.clone(),
        }
    }
}

/// Effective identity used for override resolution in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginIdentity {
    pub prefix: Option<String>,
    pub module: String,
    pub ptype: PluginType,
    pub workspace: String,
}

impl fmt::Display for PluginIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}@{})",
            qualify(self.prefix.as_deref(), &self.module),
            self.ptype,
            self.workspace
        )
    }
}

/// Split `a.b.Name` into (`Some("a.b")`, `"Name"`); names without a dot get
/// no prefix.
pub fn split_plugin_name(long_name: &str) -> (Option<String>, String) {
    match long_name.rsplit_once('.') {
        Some((prefix, module)) if !prefix.is_empty() => {
            (Some(prefix.to_string()), module.to_string())
        }
        Some((_, module)) => (None, module.to_string()),
        None => (None, long_name.to_string()),
    }
}

fn qualify(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}.{}", prefix, name),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plugin_name() {
        assert_eq!(split_plugin_name("Cuts"), (None, "Cuts".to_string()));
        assert_eq!(
            split_plugin_name("acme.tools.Cuts"),
            (Some("acme.tools".to_string()), "Cuts".to_string())
        );
        assert_eq!(split_plugin_name(".Cuts"), (None, "Cuts".to_string()));
    }

    #[test]
    fn test_from_long_name_global_defaults() {
        let desc = PluginDescriptor::from_long_name("acme.Stars", PluginType::Global);
        assert_eq!(desc.module, "Stars");
        assert_eq!(desc.namespace_prefix.as_deref(), Some("acme"));
        assert_eq!(desc.workspace, "right");
        assert_eq!(desc.menu_label(), "Stars [G]");
        assert_eq!(desc.tab_label(), "Stars");
        assert_eq!(desc.category, "Custom");
        assert!(desc.starts_at_boot());
        assert_eq!(desc.lookup_key(), "acme.Stars");
    }

    #[test]
    fn test_from_long_name_local_defaults() {
        let desc = PluginDescriptor::from_long_name("Stars", PluginType::Local);
        assert_eq!(desc.workspace, "dialogs");
        assert!(!desc.hidden);
        assert!(desc.namespace_prefix.is_none());
        assert!(!desc.starts_at_boot());
    }

    #[test]
    fn test_class_override_changes_name_and_key() {
        let desc = PluginDescriptor::local("Pick2", "dialogs")
            .with_class("Pick")
            .with_prefix("extra");
        assert_eq!(desc.name(), "Pick");
        assert_eq!(desc.lookup_key(), "extra.Pick");
        // Identity still follows the module name
        assert_eq!(desc.identity().module, "Pick2");
    }

    #[test]
    fn test_local_start_flag_is_ignored() {
        let desc = PluginDescriptor::local("Cuts", "dialogs").with_start(true);
        assert!(!desc.starts_at_boot());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let desc: PluginDescriptor = toml::from_str(
            r#"
module = "Stars"
ptype = "global"
workspace = "right"
pfx = "acme"
start = true
"#,
        )
        .unwrap();
        assert_eq!(desc.ptype, PluginType::Global);
        assert_eq!(desc.namespace_prefix.as_deref(), Some("acme"));
        assert_eq!(desc.category, "Custom");
        assert!(desc.start);
        assert!(!desc.hidden);
    }
}
