// Plugin Discovery - externally packaged plugins registered under a named group
//
// Packages contribute providers to an extension-point group. Each provider
// returns one descriptor plus the constructor that builds it.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::types::Result;

use super::api::PluginConstructor;
use super::descriptor::PluginDescriptor;

/// Extension-point group searched for viewer plugins
pub const PLUGIN_GROUP: &str = "refview.plugins";

/// A plugin contributed by an external package
#[derive(Clone)]
pub struct ExternalPlugin {
    pub descriptor: PluginDescriptor,
    pub constructor: PluginConstructor,
}

impl std::fmt::Debug for ExternalPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalPlugin")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Callable that describes one external plugin.
pub type PluginProvider = Arc<dyn Fn() -> Result<ExternalPlugin> + Send + Sync>;

struct ProviderEntry {
    name: String,
    provider: PluginProvider,
}

/// Named groups of provider callables.
#[derive(Default)]
pub struct ExtensionPoints {
    groups: BTreeMap<String, Vec<ProviderEntry>>,
}

impl ExtensionPoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider to a group. Providers are called in registration order.
    pub fn register<F>(&mut self, group: &str, name: impl Into<String>, provider: F)
    where
        F: Fn() -> Result<ExternalPlugin> + Send + Sync + 'static,
    {
        self.groups
            .entry(group.to_string())
            .or_default()
            .push(ProviderEntry {
                name: name.into(),
                provider: Arc::new(provider),
            });
    }

    pub fn provider_names(&self, group: &str) -> Vec<&str> {
        self.groups
            .get(group)
            .map(|entries| entries.iter().map(|e| e.name.as_str()).collect())
            .unwrap_or_default()
    }

    /// Call every provider in `group`; failing or panicking providers are
    /// skipped with a warning.
    pub fn discover(&self, group: &str) -> Vec<ExternalPlugin> {
        let Some(entries) = self.groups.get(group) else {
            tracing::debug!("No providers registered for {}", group);
            return Vec::new();
        };

        let mut plugins = Vec::with_capacity(entries.len());
        for entry in entries {
            let provider = &entry.provider;
            match catch_unwind(AssertUnwindSafe(|| provider())) {
                Ok(Ok(plugin)) => {
                    tracing::info!(
                        "Discovered external plugin {} from {}",
                        plugin.descriptor.identity(),
                        entry.name
                    );
                    plugins.push(plugin);
                }
                Ok(Err(e)) => {
                    tracing::warn!("Error trying to load entry point {}: {}", entry.name, e);
                }
                Err(_) => {
                    tracing::warn!("Entry point {} panicked while loading", entry.name);
                }
            }
        }
        plugins
    }
}
