// Plugin Manifests - user plugins declared by `*.plugin.toml` files
//
// A manifest names a plugin and carries a free-form settings table. Each
// valid manifest becomes a constructor in the user factory table.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::types::{Error, Result};

use super::api::{Plugin, PluginContext, PluginConstructor};
use super::descriptor::PluginDescriptor;

/// File suffix recognised in the user plugin directory
pub const MANIFEST_SUFFIX: &str = ".plugin.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PluginManifest {
    pub plugin: ManifestHeader,
    /// Passed to the plugin as JSON when it starts
    #[serde(default)]
    pub settings: Option<toml::Table>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ManifestHeader {
    pub module: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl PluginManifest {
    /// Constructor lookup key: `prefix.module`, or just `module`.
    pub fn key(&self) -> String {
        match &self.plugin.prefix {
            Some(prefix) => format!("{}.{}", prefix, self.plugin.module),
            None => self.plugin.module.clone(),
        }
    }

    /// Settings as a JSON object; empty when the manifest has none.
    pub fn settings_json(&self) -> serde_json::Value {
        self.settings
            .as_ref()
            .and_then(|table| serde_json::to_value(table).ok())
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()))
    }
}

/// A manifest found on disk
#[derive(Debug, Clone)]
pub struct DiscoveredManifest {
    pub path: PathBuf,
    pub manifest: PluginManifest,
}

impl DiscoveredManifest {
    pub fn constructor(&self) -> PluginConstructor {
        let manifest = self.manifest.clone();
        let path = self.path.clone();
        super::api::constructor(move |_desc: &PluginDescriptor| {
            Ok(Box::new(ManifestPlugin::new(manifest.clone(), path.clone())) as Box<dyn Plugin>)
        })
    }
}

/// Scan a directory for plugin manifests.
///
/// Invalid manifests are skipped with a warning. A missing directory yields
/// nothing.
pub fn discover_manifests(dir: &Path) -> Result<Vec<DiscoveredManifest>> {
    let mut discovered = Vec::new();

    if !dir.exists() {
        tracing::debug!("Plugin directory does not exist: {}", dir.display());
        return Ok(discovered);
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(MANIFEST_SUFFIX))
        })
        .collect();
    paths.sort();

    for path in paths {
        match load_manifest(&path) {
            Ok(manifest) => {
                tracing::debug!("Discovered plugin manifest: {} at {}", manifest.key(), path.display());
                discovered.push(DiscoveredManifest { path, manifest });
            }
            Err(e) => {
                tracing::warn!("Failed to load plugin manifest at {}: {}", path.display(), e);
            }
        }
    }

    Ok(discovered)
}

/// Load a plugin manifest from a file
pub fn load_manifest(path: &Path) -> Result<PluginManifest> {
    let content = std::fs::read_to_string(path)?;
    let manifest: PluginManifest = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid plugin manifest: {}", e)))?;
    if manifest.plugin.module.trim().is_empty() {
        return Err(Error::Config("Plugin manifest has an empty module name".into()));
    }
    Ok(manifest)
}

// ─────────────────────────────────────────────────────────────────────────────
// Manifest Plugin
// ─────────────────────────────────────────────────────────────────────────────

/// Plugin instance configured entirely by its manifest
#[derive(Debug)]
pub struct ManifestPlugin {
    manifest: PluginManifest,
    path: PathBuf,
    context: Option<PluginContext>,
}

impl ManifestPlugin {
    pub fn new(manifest: PluginManifest, path: PathBuf) -> Self {
        Self {
            manifest,
            path,
            context: None,
        }
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    pub fn is_started(&self) -> bool {
        self.context.is_some()
    }
}

impl Plugin for ManifestPlugin {
    fn start(&mut self, ctx: PluginContext) -> Result<()> {
        tracing::info!(
            "Starting {} from {} in '{}' with settings {}",
            self.manifest.key(),
            self.path.display(),
            ctx.workspace,
            self.manifest.settings_json()
        );
        self.context = Some(ctx);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.context = None;
        Ok(())
    }
}
