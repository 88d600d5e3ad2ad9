// Command Line - viewer options and how they merge with saved settings
//
// A list given on the command line replaces the saved one outright
// (disabled plugins, channels). Plugin lists are the exception: saved and
// command-line plugins are both registered, command line last, so a
// command-line entry overrides a saved one with the same identity.

use std::path::PathBuf;

use clap::Parser;

use crate::backend::SubsystemOverrides;
use crate::channel::ChannelConfig;
use crate::config::{GeneralSettings, default_base_dir, split_names};
use crate::shell::StartupPlan;

/// Refview image viewer
#[derive(Parser, Debug, Clone)]
#[command(name = "refview")]
#[command(about = "Extensible image viewer", long_about = None)]
pub struct CliArgs {
    /// Buffer length to NUM images per channel
    #[arg(long, value_name = "NUM", default_value_t = 10)]
    pub bufsize: usize,

    /// Specify list of channels to create
    #[arg(short, long, value_name = "LIST")]
    pub channels: Option<String>,

    /// Enter the debugger on an unhandled error (raises logging to debug)
    #[arg(long)]
    pub debug: bool,

    /// Specify comma-separated list of plugins to disable
    #[arg(long, value_name = "NAMES")]
    pub disable_plugins: Option<String>,

    /// Use X display on HOST:N
    #[arg(long, value_name = "HOST:N")]
    pub display: Option<String>,

    /// Prefer FITS I/O module NAME
    #[arg(long, value_name = "NAME")]
    pub fitspkg: Option<String>,

    /// X geometry for initial size and placement
    #[arg(short, long, value_name = "GEOM")]
    pub geometry: Option<String>,

    /// Specify comma-separated list of global plugins to load
    #[arg(long, value_name = "NAMES")]
    pub modules: Option<String>,

    /// Don't restore the window layout
    #[arg(long)]
    pub norestore: bool,

    /// Don't display the splash screen
    #[arg(long)]
    pub nosplash: bool,

    /// Start NUM worker threads in the task pool
    #[arg(long, value_name = "NUM", default_value_t = 30)]
    pub numthreads: usize,

    /// Use OpenCv acceleration
    #[arg(long)]
    pub opencv: bool,

    /// Use OpenCL acceleration
    #[arg(long)]
    pub opencl: bool,

    /// Specify comma-separated list of local plugins to load
    #[arg(long, value_name = "NAMES")]
    pub plugins: Option<String>,

    /// Log startup phase timings
    #[arg(long)]
    pub profile: bool,

    /// Load files in separate channels
    #[arg(long = "sep")]
    pub separate_channels: bool,

    /// Prefer widget toolkit NAME
    #[arg(short, long, value_name = "NAME")]
    pub toolkit: Option<String>,

    /// Prefer WCS module NAME
    #[arg(long, value_name = "NAME")]
    pub wcspkg: Option<String>,

    /// Logging filter directive
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub loglevel: String,

    /// Preferences directory (default: $REFVIEW_HOME or ~/.refview)
    #[arg(long, value_name = "DIR")]
    pub basedir: Option<PathBuf>,

    /// Image files to load; `file[ext]` selects an extension
    #[arg(value_name = "FILE")]
    pub files: Vec<String>,
}

impl CliArgs {
    /// Filter directive for the log subscriber.
    pub fn log_filter(&self) -> String {
        if self.debug {
            "debug".to_string()
        } else {
            self.loglevel.clone()
        }
    }

    pub fn base_dir(&self) -> PathBuf {
        self.basedir.clone().unwrap_or_else(default_base_dir)
    }

    /// Toolkit to ask for: the command line, else the saved `widgetSet`.
    pub fn toolkit_preference(&self, settings: &GeneralSettings) -> String {
        self.toolkit
            .clone()
            .unwrap_or_else(|| settings.widget_set.clone())
    }

    pub fn subsystem_overrides(&self) -> SubsystemOverrides {
        SubsystemOverrides {
            wcs_pkg: self.wcspkg.clone(),
            fits_pkg: self.fitspkg.clone(),
            opencv: self.opencv,
            opencl: self.opencl,
        }
    }

    pub fn channel_config(&self, settings: &GeneralSettings) -> ChannelConfig {
        ChannelConfig {
            prefix: settings.channel_prefix.clone(),
            num_images: self.bufsize,
            ..ChannelConfig::default()
        }
    }

    /// Saved layout to restore and save, unless disabled.
    pub fn layout_file(&self, settings: &GeneralSettings) -> Option<PathBuf> {
        (!self.norestore && settings.save_layout).then(|| self.base_dir().join("layout"))
    }
}

impl StartupPlan {
    pub fn from_args(args: &CliArgs, settings: &GeneralSettings) -> Self {
        let names = |arg: &Option<String>| arg.as_deref().map(split_names);

        Self {
            saved_global_plugins: settings.saved_global_plugins(),
            saved_local_plugins: settings.saved_local_plugins(),
            global_plugins: names(&args.modules).unwrap_or_default(),
            local_plugins: names(&args.plugins).unwrap_or_default(),
            disabled: names(&args.disable_plugins)
                .unwrap_or_else(|| settings.disabled_plugins()),
            channels: names(&args.channels).unwrap_or_else(|| settings.saved_channels()),
            files: args.files.clone(),
            separate_channels: args.separate_channels,
            geometry: args.geometry.clone(),
            show_banner: !args.nosplash && settings.show_banner,
            profile: args.profile,
        }
    }
}
