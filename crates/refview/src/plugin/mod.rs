// Plugin System - descriptors, registry, loading and discovery
//
// Plugin Lifecycle:
// 1. Registration: defaults, external packages, saved settings, the command
//    line and config hooks feed descriptors into the registry
// 2. Resolution: the registry drops disabled modules and yields the final list
// 3. Loading: the module loader finds a constructor and builds the instance
// 4. Runtime: the shell starts, notifies and stops instances

pub mod api;
pub mod builtin;
pub mod defaults;
pub mod descriptor;
pub mod discovery;
pub mod loader;
pub mod manifest;
pub mod registry;

pub use api::{Plugin, PluginConstructor, PluginContext, constructor};
pub use builtin::{ViewPlugin, bundled_factories};
pub use defaults::DefaultPlugins;
pub use descriptor::{PluginDescriptor, PluginIdentity, PluginType, split_plugin_name};
pub use discovery::{ExtensionPoints, ExternalPlugin, PLUGIN_GROUP, PluginProvider};
pub use loader::{FactoryTable, LoadError, ModuleLoader};
pub use manifest::{ManifestPlugin, PluginManifest, discover_manifests};
pub use registry::{PluginRegistry, PluginSource, RegisteredPlugin};
