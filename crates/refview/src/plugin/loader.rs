// Module Loader - resolves a descriptor to a constructed plugin
//
// Resolution order: an explicit manifest `path`, then the lookup key in the
// user factory table, the bundled table, and finally external providers.
// Constructors run inside `catch_unwind` so a broken plugin becomes a
// structured failure instead of taking the shell down.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};

use super::api::{Plugin, PluginConstructor};
use super::descriptor::PluginDescriptor;
use super::discovery::ExternalPlugin;
use super::manifest::{DiscoveredManifest, discover_manifests, load_manifest};

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("no plugin named '{name}' (searched: {})", .searched.join(", "))]
    NotFound { name: String, searched: Vec<String> },

    #[error("bad plugin manifest {}: {reason}", .path.display())]
    Manifest { path: PathBuf, reason: String },

    #[error("failed to construct plugin '{name}': {reason}")]
    Construct { name: String, reason: String },

    #[error("plugin '{name}' panicked during construction: {reason}")]
    Panicked { name: String, reason: String },
}

// ─────────────────────────────────────────────────────────────────────────────
// Factory Table
// ─────────────────────────────────────────────────────────────────────────────

/// Named constructors from one search location.
#[derive(Clone, Default)]
pub struct FactoryTable {
    location: String,
    constructors: HashMap<String, PluginConstructor>,
}

impl FactoryTable {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            constructors: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, constructor: PluginConstructor) {
        self.constructors.insert(key.into(), constructor);
    }

    pub fn get(&self, key: &str) -> Option<&PluginConstructor> {
        self.constructors.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.constructors.contains_key(key)
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl std::fmt::Debug for FactoryTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.constructors.keys().collect();
        keys.sort();
        f.debug_struct("FactoryTable")
            .field("location", &self.location)
            .field("constructors", &keys)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Module Loader
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ModuleLoader {
    user: FactoryTable,
    bundled: FactoryTable,
    external: FactoryTable,
}

impl ModuleLoader {
    pub fn new(bundled: FactoryTable) -> Self {
        Self {
            user: FactoryTable::new("user plugins"),
            bundled,
            external: FactoryTable::new(super::discovery::PLUGIN_GROUP),
        }
    }

    /// Scan the user plugin directory once and add its manifests.
    pub fn with_user_dir(mut self, dir: &Path) -> Self {
        self.user = FactoryTable::new(dir.display().to_string());
        match discover_manifests(dir) {
            Ok(found) => {
                for entry in found {
                    self.user.insert(entry.manifest.key(), entry.constructor());
                }
            }
            Err(e) => {
                tracing::warn!("Cannot scan plugin directory {}: {}", dir.display(), e);
            }
        }
        self
    }

    /// Make an externally discovered plugin resolvable by its lookup key.
    pub fn add_external(&mut self, plugin: &ExternalPlugin) {
        self.external
            .insert(plugin.descriptor.lookup_key(), plugin.constructor.clone());
    }

    /// Add a constructor to the user table, shadowing bundled ones.
    pub fn add_user(&mut self, key: impl Into<String>, constructor: PluginConstructor) {
        self.user.insert(key, constructor);
    }

    /// Search locations in resolution order.
    pub fn search_locations(&self) -> Vec<String> {
        vec![
            self.user.location().to_string(),
            self.bundled.location().to_string(),
            self.external.location().to_string(),
        ]
    }

    /// Whether `load` would find a constructor, without building anything.
    pub fn can_resolve(&self, desc: &PluginDescriptor) -> bool {
        desc.path.is_some() || self.find(&desc.lookup_key()).is_some()
    }

    /// Resolve and construct the plugin a descriptor names.
    pub fn load(&self, desc: &PluginDescriptor) -> Result<Box<dyn Plugin>, LoadError> {
        let key = desc.lookup_key();

        let constructor = match &desc.path {
            Some(path) => {
                let manifest = load_manifest(path).map_err(|e| LoadError::Manifest {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
                DiscoveredManifest {
                    path: path.clone(),
                    manifest,
                }
                .constructor()
            }
            None => self.find(&key).cloned().ok_or_else(|| LoadError::NotFound {
                name: key.clone(),
                searched: self.search_locations(),
            })?,
        };

        tracing::debug!("Constructing plugin {}", desc.identity());
        match catch_unwind(AssertUnwindSafe(|| constructor(desc))) {
            Ok(Ok(plugin)) => Ok(plugin),
            Ok(Err(e)) => Err(LoadError::Construct {
                name: key,
                reason: e.to_string(),
            }),
            Err(payload) => Err(LoadError::Panicked {
                name: key,
                reason: panic_message(payload.as_ref()),
            }),
        }
    }

    fn find(&self, key: &str) -> Option<&PluginConstructor> {
        self.user
            .get(key)
            .or_else(|| self.bundled.get(key))
            .or_else(|| self.external.get(key))
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::api::{PluginContext, constructor};
    use crate::types::{Error, Result};
    use tempfile::TempDir;

    struct Stub;

    impl Plugin for Stub {
        fn start(&mut self, _ctx: PluginContext) -> Result<()> {
            Ok(())
        }
    }

    fn stub() -> PluginConstructor {
        constructor(|_| Ok(Box::new(Stub) as Box<dyn Plugin>))
    }

    fn bundled() -> FactoryTable {
        let mut table = FactoryTable::new("bundled");
        table.insert("Pan", stub());
        table.insert("Broken", constructor(|_| Err(Error::Plugin("no display".into()))));
        table.insert("Explodes", constructor(|_| panic!("constructor blew up")));
        table
    }

    #[test]
    fn test_load_bundled_and_not_found() {
        let loader = ModuleLoader::new(bundled());
        assert!(loader.load(&PluginDescriptor::global("Pan", "uleft")).is_ok());

        let err = loader
            .load(&PluginDescriptor::global("Nope", "right"))
            .err()
            .unwrap();
        match err {
            LoadError::NotFound { name, searched } => {
                assert_eq!(name, "Nope");
                assert_eq!(searched.len(), 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_construct_failure_and_panic_are_isolated() {
        let loader = ModuleLoader::new(bundled());

        let err = loader.load(&PluginDescriptor::local("Broken", "dialogs")).err().unwrap();
        assert!(matches!(err, LoadError::Construct { .. }));

        let err = loader.load(&PluginDescriptor::local("Explodes", "dialogs")).err().unwrap();
        match err {
            LoadError::Panicked { name, reason } => {
                assert_eq!(name, "Explodes");
                assert!(reason.contains("blew up"));
            }
            other => panic!("unexpected error: {other}"),
        }

        // The loader is still usable afterwards
        assert!(loader.load(&PluginDescriptor::global("Pan", "uleft")).is_ok());
    }

    #[test]
    fn test_user_dir_shadows_bundled_and_prefix_qualifies() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("pan.plugin.toml"),
            "[plugin]\nmodule = \"Pan\"\n",
        )
        .unwrap();
        std::fs::write(
            temp.path().join("cuts.plugin.toml"),
            "[plugin]\nmodule = \"Cuts\"\nprefix = \"acme\"\n",
        )
        .unwrap();

        let loader = ModuleLoader::new(bundled()).with_user_dir(temp.path());
        assert_eq!(loader.search_locations()[0], temp.path().display().to_string());
        assert!(loader.can_resolve(&PluginDescriptor::local("Cuts", "dialogs").with_prefix("acme")));
        assert!(!loader.can_resolve(&PluginDescriptor::local("Cuts", "dialogs")));
        assert!(loader.load(&PluginDescriptor::global("Pan", "uleft")).is_ok());
    }

    #[test]
    fn test_class_override_and_explicit_path() {
        let temp = TempDir::new().unwrap();
        let manifest = temp.path().join("stars.plugin.toml");
        std::fs::write(&manifest, "[plugin]\nmodule = \"Stars\"\n").unwrap();

        let loader = ModuleLoader::new(bundled());
        let by_class = PluginDescriptor::global("MyPan", "uleft").with_class("Pan");
        assert!(loader.load(&by_class).is_ok());

        let by_path = PluginDescriptor::global("Stars", "right").with_path(&manifest);
        assert!(loader.load(&by_path).is_ok());

        let missing = PluginDescriptor::global("Stars", "right")
            .with_path(temp.path().join("missing.plugin.toml"));
        assert!(matches!(loader.load(&missing), Err(LoadError::Manifest { .. })));
    }

    #[test]
    fn test_external_is_searched_last() {
        let mut loader = ModuleLoader::new(bundled());
        let desc = PluginDescriptor::global("Stars", "right").with_prefix("acme");
        assert!(!loader.can_resolve(&desc));

        loader.add_external(&ExternalPlugin {
            descriptor: desc.clone(),
            constructor: stub(),
        });
        assert!(loader.load(&desc).is_ok());
    }
}
