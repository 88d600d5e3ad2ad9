// Configuration - general settings, preferences directory and the hook file

pub mod settings;
pub mod user_config;

pub use settings::{
    BASE_DIR_ENV, GeneralSettings, NameList, Preferences, SettingsError, default_base_dir,
    split_names,
};
pub use user_config::{HookActions, UserConfig};
