// Plugin Registry - ordered, deduplicated set of plugin descriptors
//
// Registration order is precedence order: a later registration of the same
// effective identity replaces the earlier one in place.

use std::collections::{HashMap, HashSet};
use std::fmt;

use super::defaults::DefaultPlugins;
use super::descriptor::{PluginDescriptor, PluginIdentity};

/// Where a descriptor came from, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PluginSource {
    Builtin,
    External,
    Saved,
    CommandLine,
    ConfigHook,
    Embedder,
}

impl fmt::Display for PluginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PluginSource::Builtin => "built-in",
            PluginSource::External => "external package",
            PluginSource::Saved => "saved settings",
            PluginSource::CommandLine => "command line",
            PluginSource::ConfigHook => "config hook",
            PluginSource::Embedder => "embedder",
        };
        f.write_str(label)
    }
}

/// A descriptor together with its origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredPlugin {
    pub descriptor: PluginDescriptor,
    pub source: PluginSource,
}

/// Ordered mapping from effective identity to descriptor.
///
/// Owned by the event-loop thread; not synchronized.
#[derive(Debug, Default, Clone)]
pub struct PluginRegistry {
    entries: Vec<RegisteredPlugin>,
    index: HashMap<PluginIdentity, usize>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry seeded with a default plugin set.
    pub fn with_defaults(defaults: &DefaultPlugins) -> Self {
        let mut registry = Self::new();
        for desc in defaults.iter() {
            registry.register_from(desc.clone(), PluginSource::Builtin);
        }
        registry
    }

    /// Register a descriptor supplied by the embedding application.
    pub fn register(&mut self, descriptor: PluginDescriptor) {
        self.register_from(descriptor, PluginSource::Embedder);
    }

    /// Register a descriptor, replacing any earlier one with the same identity.
    pub fn register_from(&mut self, descriptor: PluginDescriptor, source: PluginSource) {
        let identity = descriptor.identity();
        let existing = self.index.get(&identity).copied();
        match existing {
            Some(pos) => {
                let entry = &mut self.entries[pos];
                tracing::debug!(
                    "Plugin {} from {} overrides the one from {}",
                    identity,
                    source,
                    entry.source
                );
                *entry = RegisteredPlugin { descriptor, source };
            }
            None => {
                tracing::trace!("Registered plugin {} from {}", identity, source);
                self.index.insert(identity, self.entries.len());
                self.entries.push(RegisteredPlugin { descriptor, source });
            }
        }
    }

    /// Remove every descriptor.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// The final ordered plugin list, minus disabled modules.
    ///
    /// Disabling matches the bare module name, case-insensitively, whatever
    /// the namespace prefix.
    pub fn resolve<S: AsRef<str>>(&self, disabled: &[S]) -> Vec<PluginDescriptor> {
        let disabled: HashSet<String> = disabled
            .iter()
            .map(|name| name.as_ref().trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect();

        self.entries
            .iter()
            .filter(|entry| {
                let keep = !disabled.contains(&entry.descriptor.module.to_lowercase());
                if !keep {
                    tracing::debug!("Plugin {} is disabled", entry.descriptor.identity());
                }
                keep
            })
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    pub fn get(&self, identity: &PluginIdentity) -> Option<&RegisteredPlugin> {
        self.index.get(identity).map(|&pos| &self.entries[pos])
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredPlugin> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
