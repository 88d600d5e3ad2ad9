//! Refview
//!
//! Image viewer shell: builds the window layout, boots plugins, creates
//! channels, loads files and runs the event loop until interrupted.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use refview::backend::{Subsystems, ToolkitRegistry};
use refview::cli::CliArgs;
use refview::config::{Preferences, UserConfig};
use refview::shell::{DEFAULT_POLL, ShellBuilder, StartupPlan, shutdown_signal, watch_interrupt};

/// How long to wait for pool workers after shutdown
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    let args = CliArgs::parse();

    if let Some(display) = &args.display {
        // SAFETY: no other threads exist yet.
        unsafe { std::env::set_var("DISPLAY", display) };
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(args.log_filter())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting refview v{}", env!("CARGO_PKG_VERSION"));

    let prefs = Preferences::open(args.base_dir());
    let settings = prefs.load_general();

    let user_config = match UserConfig::load(&prefs.config_hook_path()) {
        Ok(config) => config,
        Err(e) => {
            error!("Error importing config file: {}", e);
            None
        }
    };

    // The toolkit is the one thing startup cannot do without
    let toolkit = match ToolkitRegistry::with_builtin().select(&args.toolkit_preference(&settings)) {
        Ok(toolkit) => toolkit,
        Err(e) => {
            error!("Error choosing toolkit: {}", e);
            std::process::exit(1);
        }
    };
    info!("Using toolkit {}", toolkit.name());

    let subsystems = Subsystems::configure(&settings, &args.subsystem_overrides());
    info!(
        "WCS {} / FITS {} / accelerator {:?}",
        subsystems.wcs_pkg, subsystems.fits_pkg, subsystems.accelerator
    );

    let plan = StartupPlan::from_args(&args, &settings);

    let mut builder = ShellBuilder::new()
        .with_workers(args.numthreads)
        .with_channel_config(args.channel_config(&settings))
        .with_layout_file(args.layout_file(&settings))
        .with_max_depth(settings.recursion_limit)
        .with_user_plugin_dir(prefs.plugin_dir())
        .with_preferences(prefs.clone(), settings.clone());
    if let Some(config) = user_config {
        builder = builder.with_hook(Box::new(config));
    }
    let mut shell = builder.build(toolkit)?;

    // The event loop runs on this thread; the one runtime worker watches
    // for Ctrl+C and SIGTERM, from startup onwards.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?;
    let interrupt = watch_interrupt(runtime.handle(), shutdown_signal(), shell.ui_handle());

    let started = shell.startup(&plan);
    match &started {
        Ok(()) => runtime.block_on(shell.mainloop(DEFAULT_POLL)),
        Err(e) => error!("Startup failed: {}", e),
    }
    interrupt.abort();

    if let Err(e) = shell.shutdown() {
        warn!("Error during shutdown: {}", e);
    }
    if let Err(e) = shell.pool().join(JOIN_TIMEOUT) {
        warn!("{}", e);
    }

    started?;
    info!("Refview shutdown complete");
    Ok(())
}
