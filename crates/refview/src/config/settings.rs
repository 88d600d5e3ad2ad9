//! General Settings
//!
//! `general.toml` under the per-user base directory. Unknown keys are kept
//! out of the way by serde; a missing or broken file means defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variable overriding the base directory
pub const BASE_DIR_ENV: &str = "REFVIEW_HOME";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("cannot read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("cannot parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("cannot write {path}: {reason}")]
    Write { path: String, reason: String },
}

/// A list of names given either as an array or a comma separated string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NameList {
    List(Vec<String>),
    Csv(String),
}

impl NameList {
    pub fn names(&self) -> Vec<String> {
        match self {
            NameList::List(items) => items
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            NameList::Csv(text) => split_names(text),
        }
    }
}

/// Split a comma separated name list, dropping blanks.
pub fn split_names(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    #[serde(rename = "useMatplotlibColormaps")]
    pub use_matplotlib_colormaps: bool,
    #[serde(rename = "widgetSet")]
    pub widget_set: String,
    #[serde(rename = "WCSpkg")]
    pub wcs_pkg: String,
    #[serde(rename = "FITSpkg")]
    pub fits_pkg: String,
    pub recursion_limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icc_working_profile: Option<String>,
    pub save_layout: bool,
    pub channel_prefix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_plugins: Option<NameList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_plugins: Option<NameList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_plugins: Option<NameList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<NameList>,
    pub use_opencv: bool,
    pub use_opencl: bool,
    #[serde(rename = "showBanner")]
    pub show_banner: bool,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            use_matplotlib_colormaps: false,
            widget_set: "choose".to_string(),
            wcs_pkg: "choose".to_string(),
            fits_pkg: "choose".to_string(),
            recursion_limit: 2000,
            icc_working_profile: None,
            save_layout: true,
            channel_prefix: "Image".to_string(),
            disable_plugins: None,
            global_plugins: None,
            local_plugins: None,
            channels: None,
            use_opencv: false,
            use_opencl: false,
            show_banner: true,
        }
    }
}

fn list_or_empty(list: &Option<NameList>) -> Vec<String> {
    list.as_ref().map(NameList::names).unwrap_or_default()
}

impl GeneralSettings {
    pub fn disabled_plugins(&self) -> Vec<String> {
        list_or_empty(&self.disable_plugins)
    }

    pub fn saved_global_plugins(&self) -> Vec<String> {
        list_or_empty(&self.global_plugins)
    }

    pub fn saved_local_plugins(&self) -> Vec<String> {
        list_or_empty(&self.local_plugins)
    }

    pub fn saved_channels(&self) -> Vec<String> {
        list_or_empty(&self.channels)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Preferences directory
// ─────────────────────────────────────────────────────────────────────────────

/// `$REFVIEW_HOME`, else `~/.refview`.
pub fn default_base_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(BASE_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".refview")
}

/// The per-user preferences area and the files in it.
#[derive(Debug, Clone)]
pub struct Preferences {
    base: PathBuf,
    writable: bool,
}

impl Preferences {
    /// Use `base`, creating it if needed. Failure to create it only means
    /// nothing can be saved.
    pub fn open(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        let writable = match std::fs::create_dir_all(&base) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Couldn't create settings area ({}): {}", base.display(), e);
                tracing::warn!("Preferences will not be able to be saved");
                false
            }
        };
        Self { base, writable }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn general_path(&self) -> PathBuf {
        self.base.join("general.toml")
    }

    pub fn layout_path(&self) -> PathBuf {
        self.base.join("layout")
    }

    pub fn config_hook_path(&self) -> PathBuf {
        self.base.join("config.toml")
    }

    pub fn plugin_dir(&self) -> PathBuf {
        self.base.join("plugins")
    }

    /// Load `general.toml`; anything wrong yields defaults.
    pub fn load_general(&self) -> GeneralSettings {
        match self.try_load_general() {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!("Using default settings: {}", e);
                GeneralSettings::default()
            }
        }
    }

    pub fn try_load_general(&self) -> Result<GeneralSettings, SettingsError> {
        let path = self.general_path();
        let content = std::fs::read_to_string(&path).map_err(|e| SettingsError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| SettingsError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn save_general(&self, settings: &GeneralSettings) -> Result<(), SettingsError> {
        let path = self.general_path();
        let write_err = |reason: String| SettingsError::Write {
            path: path.display().to_string(),
            reason,
        };
        let content = toml::to_string_pretty(settings).map_err(|e| write_err(e.to_string()))?;
        std::fs::write(&path, content).map_err(|e| write_err(e.to_string()))?;
        tracing::debug!("Saved settings to {}", path.display());
        Ok(())
    }
}
