//! Shell controller
//!
//! Owns the plugin registry, the compiled layout, the channels and every
//! running plugin, and drives startup through [`ShellState`]. All of it
//! lives on the event-loop thread; pool workers reach it only through
//! [`UiHandle::gui_do`].
//!
//! # Startup
//!
//! 1. Saved and command-line plugins are registered
//! 2. `before_ui` hooks run, then the layout is compiled and built
//! 3. `after_ui` hooks run, then the enabled list is resolved and placed
//! 4. `start = true` plugins are booted, each in isolation
//! 5. Channels are created and one is activated, then `after_channels` hooks
//! 6. Files are assigned to channels and loaded on the pool

use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use refview_tasks::{QuitSignal, Task, ThreadPool};
use tracing::{debug, error, info, warn};

use crate::backend::{FileProbe, Geometry, ImageInfo, ImageOpener, Toolkit};
use crate::channel::{ChannelConfig, ChannelError, ChannelManager};
use crate::config::{GeneralSettings, Preferences};
use crate::files::expand_file_args;
use crate::layout::{
    CompiledLayout, ContainerId, DEFAULT_MAX_DEPTH, LayoutCompiler, LayoutError, LayoutNode,
    default_layout, save_layout,
};
use crate::plugin::loader::panic_message;
use crate::plugin::{
    DefaultPlugins, ExtensionPoints, FactoryTable, ModuleLoader, PLUGIN_GROUP, Plugin,
    PluginContext, PluginDescriptor, PluginIdentity, PluginRegistry, PluginSource, PluginType,
    bundled_factories,
};
use crate::types::{Error, Result};

use super::event_loop::{EventQueue, UiCallback, UiHandle, shutdown_signal, ui_channel};
use super::hooks::{ConfigHook, HookPoint};
use super::report::{Phase, StartupReport};
use super::state::{ShellState, StateError, StateMachine};

pub const DEFAULT_WORKERS: usize = 30;

/// Longest the event loop waits for a UI callback before rechecking `quit`
pub const DEFAULT_POLL: Duration = Duration::from_millis(100);

/// Tabs brought to the front once the boot plugins are up
const RAISED_TABS: [&str; 3] = ["Info", "Synopsis", "Thumbs"];

const WINDOW_TITLE: &str = "refview";

// ─────────────────────────────────────────────────────────────────────────────
// Startup Plan
// ─────────────────────────────────────────────────────────────────────────────

/// Everything startup needs from the command line and saved settings,
/// already merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupPlan {
    pub saved_global_plugins: Vec<String>,
    pub saved_local_plugins: Vec<String>,
    pub global_plugins: Vec<String>,
    pub local_plugins: Vec<String>,
    pub disabled: Vec<String>,
    pub channels: Vec<String>,
    pub files: Vec<String>,
    pub separate_channels: bool,
    pub geometry: Option<String>,
    pub show_banner: bool,
    pub profile: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

pub struct ShellBuilder {
    defaults: DefaultPlugins,
    factories: Option<FactoryTable>,
    extensions: ExtensionPoints,
    user_plugin_dir: Option<PathBuf>,
    layout: LayoutNode,
    layout_file: Option<PathBuf>,
    max_depth: usize,
    channel_config: ChannelConfig,
    workers: usize,
    hooks: Vec<Box<dyn ConfigHook>>,
    opener: Arc<dyn ImageOpener>,
    preferences: Option<(Preferences, GeneralSettings)>,
}

impl Default for ShellBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellBuilder {
    pub fn new() -> Self {
        Self {
            defaults: DefaultPlugins::reference(),
            factories: None,
            extensions: ExtensionPoints::new(),
            user_plugin_dir: None,
            layout: default_layout(),
            layout_file: None,
            max_depth: DEFAULT_MAX_DEPTH,
            channel_config: ChannelConfig::default(),
            workers: DEFAULT_WORKERS,
            hooks: Vec::new(),
            opener: Arc::new(FileProbe),
            preferences: None,
        }
    }

    pub fn with_defaults(mut self, defaults: DefaultPlugins) -> Self {
        self.defaults = defaults;
        self
    }

    /// Replace the bundled constructors (by default one per default plugin).
    pub fn with_factories(mut self, factories: FactoryTable) -> Self {
        self.factories = Some(factories);
        self
    }

    pub fn with_extensions(mut self, extensions: ExtensionPoints) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_user_plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_plugin_dir = Some(dir.into());
        self
    }

    pub fn with_layout(mut self, layout: LayoutNode) -> Self {
        self.layout = layout;
        self
    }

    /// Saved layout to restore from at startup and write back at shutdown.
    pub fn with_layout_file(mut self, path: Option<PathBuf>) -> Self {
        self.layout_file = path;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_channel_config(mut self, config: ChannelConfig) -> Self {
        self.channel_config = config;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_hook(mut self, hook: Box<dyn ConfigHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn with_opener(mut self, opener: Arc<dyn ImageOpener>) -> Self {
        self.opener = opener;
        self
    }

    /// Settings to update (and save) when startup changes them.
    pub fn with_preferences(mut self, prefs: Preferences, settings: GeneralSettings) -> Self {
        self.preferences = Some((prefs, settings));
        self
    }

    /// Start the task pool, seed the registry and discover external plugins.
    pub fn build(self, toolkit: Box<dyn Toolkit>) -> Result<ShellController> {
        let quit = QuitSignal::new();
        let pool = Arc::new(ThreadPool::new(quit.clone()));
        pool.start(self.workers)?;

        let mut registry = PluginRegistry::with_defaults(&self.defaults);
        let bundled = self
            .factories
            .unwrap_or_else(|| bundled_factories(&self.defaults));
        let mut loader = ModuleLoader::new(bundled);
        if let Some(dir) = &self.user_plugin_dir {
            loader = loader.with_user_dir(dir);
        }

        for plugin in self.extensions.discover(PLUGIN_GROUP) {
            loader.add_external(&plugin);
            registry.register_from(plugin.descriptor.clone(), PluginSource::External);
        }

        let (ui, events) = ui_channel(quit.clone());
        info!(
            "Shell ready: toolkit {}, {} workers, {} registered plugins",
            toolkit.name(),
            self.workers,
            registry.len()
        );

        Ok(ShellController {
            toolkit,
            registry,
            loader,
            layout_tree: self.layout,
            layout_file: self.layout_file,
            max_depth: self.max_depth,
            layout: None,
            channels: ChannelManager::new(self.channel_config),
            pool,
            quit,
            ui,
            events: Some(events),
            hooks: self.hooks,
            disabled: Vec::new(),
            enabled: Vec::new(),
            placements: HashMap::new(),
            globals: Vec::new(),
            locals: Vec::new(),
            state: StateMachine::new(),
            report: StartupReport::new(),
            opener: self.opener,
            preferences: self.preferences,
            pending_channels: Vec::new(),
            pending_activate: None,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Controller
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Placement {
    container: ContainerId,
    workspace: String,
}

struct RunningPlugin {
    descriptor: PluginDescriptor,
    workspace: String,
    view: String,
    channel: Option<String>,
    instance: Box<dyn Plugin>,
}

pub struct ShellController {
    toolkit: Box<dyn Toolkit>,
    registry: PluginRegistry,
    loader: ModuleLoader,
    layout_tree: LayoutNode,
    layout_file: Option<PathBuf>,
    max_depth: usize,
    layout: Option<CompiledLayout>,
    channels: ChannelManager,
    pool: Arc<ThreadPool>,
    quit: QuitSignal,
    ui: UiHandle,
    events: Option<EventQueue>,
    hooks: Vec<Box<dyn ConfigHook>>,
    disabled: Vec<String>,
    enabled: Vec<PluginDescriptor>,
    placements: HashMap<PluginIdentity, Placement>,
    globals: Vec<RunningPlugin>,
    locals: Vec<RunningPlugin>,
    state: StateMachine,
    report: StartupReport,
    opener: Arc<dyn ImageOpener>,
    preferences: Option<(Preferences, GeneralSettings)>,
    pending_channels: Vec<String>,
    pending_activate: Option<String>,
}

impl ShellController {
    // ─────────────────────────────────────────────────────────────────────
    // Startup
    // ─────────────────────────────────────────────────────────────────────

    /// Run the whole startup sequence up to `Running`.
    ///
    /// Plugin, hook and file failures are recorded in the report and do not
    /// stop startup. Returns early, without error, if quit is requested.
    pub fn startup(&mut self, plan: &StartupPlan) -> Result<()> {
        if self.state.current() != ShellState::Init {
            return Err(StateError::InvalidTransition {
                from: self.state.current(),
                to: ShellState::LayoutBuilt,
            }
            .into());
        }

        self.register_plan(plan);
        self.disable_plugins(&plan.disabled);
        for name in &plan.channels {
            self.queue_channel(name);
        }

        self.run_hooks(HookPoint::BeforeUi);
        if self.interrupted() {
            return Ok(());
        }

        self.build_ui(plan.geometry.as_deref())?;
        self.state.advance(ShellState::LayoutBuilt)?;

        self.run_hooks(HookPoint::AfterUi);
        self.materialize();
        self.state.advance(ShellState::PluginsRegistered)?;
        if self.interrupted() {
            return Ok(());
        }

        self.boot_plugins();
        for title in RAISED_TABS {
            self.toolkit.raise_tab(title);
        }
        self.state.advance(ShellState::PluginsBooted)?;
        if self.interrupted() {
            return Ok(());
        }

        self.setup_channels();
        self.state.advance(ShellState::ChannelsReady)?;
        self.run_hooks(HookPoint::AfterChannels);
        if self.interrupted() {
            return Ok(());
        }

        if plan.show_banner && plan.files.is_empty() {
            self.show_banner();
        }
        self.load_files(&plan.files, plan.separate_channels);
        self.state.advance(ShellState::Running)?;

        let failures = self.report.failures().count();
        if failures > 0 {
            warn!("Startup finished with {} failure(s)", failures);
        }
        if plan.profile {
            for (state, elapsed) in self.state.timings() {
                info!("Startup phase {}: {:.3?}", state, elapsed);
            }
        }
        Ok(())
    }

    fn interrupted(&self) -> bool {
        if self.quit.is_set() {
            info!("Quit requested during startup (in {})", self.state.current());
            return true;
        }
        false
    }

    fn register_plan(&mut self, plan: &StartupPlan) {
        let lists = [
            (&plan.saved_global_plugins, PluginType::Global, PluginSource::Saved),
            (&plan.saved_local_plugins, PluginType::Local, PluginSource::Saved),
            (&plan.global_plugins, PluginType::Global, PluginSource::CommandLine),
            (&plan.local_plugins, PluginType::Local, PluginSource::CommandLine),
        ];
        for (names, ptype, source) in lists {
            for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
                let desc = PluginDescriptor::from_long_name(name, ptype);
                self.report.ok(desc.identity().to_string(), Phase::Register);
                self.registry.register_from(desc, source);
            }
        }
    }

    fn build_ui(&mut self, geometry: Option<&str>) -> Result<()> {
        let compiler = LayoutCompiler::new(self.layout_tree.clone())
            .with_saved_layout(self.layout_file.clone())
            .with_max_depth(self.max_depth);
        let layout = match compiler.compile() {
            Err(LayoutError::TooDeep(limit)) if limit < DEFAULT_MAX_DEPTH => {
                warn!(
                    "Layout is nested deeper than recursion_limit {}; using {}",
                    limit, DEFAULT_MAX_DEPTH
                );
                compiler.with_max_depth(DEFAULT_MAX_DEPTH).compile()?
            }
            compiled => compiled?,
        };
        self.toolkit.build_toplevel(&layout)?;
        self.layout = Some(layout);

        if let Some(text) = geometry {
            match text.parse::<Geometry>() {
                Ok(geometry) => {
                    if let Err(e) = self.toolkit.set_geometry(&geometry) {
                        warn!("Cannot set geometry {}: {}", text, e);
                    }
                    if let (Some(hints), Some(layout)) =
                        (geometry.size_hints(), self.layout.as_mut())
                    {
                        if let Some(&top) = layout.toplevels().first() {
                            layout.set_hints(top, hints);
                        }
                    }
                }
                Err(e) => warn!("Ignoring geometry: {}", e),
            }
        }
        self.toolkit.set_title(WINDOW_TITLE);
        Ok(())
    }

    /// Resolve the enabled list once and place every plugin in it.
    fn materialize(&mut self) {
        let resolved = self.registry.resolve(&self.disabled);
        debug!(
            "{} of {} registered plugins enabled",
            resolved.len(),
            self.registry.len()
        );
        let placed: Vec<PluginDescriptor> = resolved
            .into_iter()
            .filter(|desc| self.place_plugin(desc))
            .collect();
        self.enabled = placed;
    }

    fn place_plugin(&mut self, desc: &PluginDescriptor) -> bool {
        let subject = desc.identity().to_string();
        let Some(layout) = self.layout.as_ref() else {
            return false;
        };

        match layout.place(&desc.workspace, desc.group) {
            Ok(container) => {
                let workspace = layout
                    .get(container)
                    .and_then(|c| c.name.clone())
                    .unwrap_or_else(|| desc.workspace.clone());
                self.placements.insert(
                    desc.identity(),
                    Placement {
                        container,
                        workspace,
                    },
                );
                if !desc.hidden {
                    match desc.ptype {
                        PluginType::Global => {
                            self.toolkit.add_menu_entry(&desc.category, desc.menu_label())
                        }
                        PluginType::Local => self.toolkit.add_operation(&desc.category, desc.name()),
                    }
                }
                self.report.ok(subject, Phase::Place);
                true
            }
            Err(e) => {
                error!("Error placing plugin {}: {}", subject, e);
                self.report.failed(subject, Phase::Place, e);
                false
            }
        }
    }

    fn boot_plugins(&mut self) {
        let boot: Vec<PluginDescriptor> = self
            .enabled
            .iter()
            .filter(|desc| desc.starts_at_boot())
            .cloned()
            .collect();
        info!("Booting {} plugins", boot.len());
        for desc in boot {
            if self.quit.is_set() {
                break;
            }
            self.boot_one(&desc);
        }
    }

    fn boot_one(&mut self, desc: &PluginDescriptor) {
        if self.is_global_running(desc.name()) {
            return;
        }
        let subject = desc.identity().to_string();
        match self.start_instance(desc, None) {
            Ok(running) => {
                self.globals.push(running);
                self.report.ok(subject, Phase::Start);
            }
            Err(e) => {
                error!("Error starting plugin {}: {}", subject, e);
                let phase = match e {
                    Error::Load(_) => Phase::Load,
                    _ => Phase::Start,
                };
                self.report.failed(subject, phase, e);
            }
        }
    }

    fn setup_channels(&mut self) {
        let wanted = std::mem::take(&mut self.pending_channels);
        for name in &wanted {
            match self.channels.create(name) {
                Ok(true) => {
                    self.attach_channel_view(name);
                    self.report.ok(name.as_str(), Phase::Channel);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("Cannot add channel '{}': {}", name, e);
                    self.report.failed(name.as_str(), Phase::Channel, e);
                }
            }
        }
        if let Some(name) = self.channels.ensure_default() {
            self.attach_channel_view(&name);
            self.report.ok(name, Phase::Channel);
        }

        let target = self
            .pending_activate
            .take()
            .or_else(|| wanted.iter().find(|n| self.channels.contains(n)).cloned());
        if let Some(name) = target {
            if let Err(e) = self.channels.activate(&name) {
                warn!("Cannot activate channel '{}': {}", name, e);
                self.report.failed(name, Phase::Channel, e);
            }
        }
        self.channel_activated();
    }

    fn show_banner(&mut self) {
        if let Some(name) = self.channels.active_name() {
            self.toolkit.show_banner(name);
        }
        if let Some((prefs, settings)) = &mut self.preferences {
            settings.show_banner = false;
            if let Err(e) = prefs.save_general(settings) {
                warn!("Cannot save settings: {}", e);
            }
        }
    }

    fn run_hooks(&mut self, point: HookPoint) {
        let hooks = std::mem::take(&mut self.hooks);
        for hook in &hooks {
            let subject = format!("{} {}", hook.name(), point);
            match catch_unwind(AssertUnwindSafe(|| point.run(hook.as_ref(), self))) {
                Ok(Ok(())) => self.report.ok(subject, Phase::Hook),
                Ok(Err(e)) => {
                    error!("Error processing {}: {}", subject, e);
                    self.report.failed(subject, Phase::Hook, e);
                }
                Err(payload) => {
                    let reason = panic_message(payload.as_ref());
                    error!("{} panicked: {}", subject, reason);
                    self.report.failed(subject, Phase::Hook, reason);
                }
            }
        }
        // Hooks added while running go after the existing ones
        let added = std::mem::replace(&mut self.hooks, hooks);
        self.hooks.extend(added);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────

    /// Register a plugin. Once the enabled list has been resolved, the
    /// plugin is placed right away and booted if startup is past that point.
    pub fn register_plugin(&mut self, descriptor: PluginDescriptor, source: PluginSource) {
        if !self.state.reached(ShellState::PluginsRegistered) {
            self.registry.register_from(descriptor, source);
            return;
        }
        if self.is_disabled(&descriptor.module) {
            debug!("Not adding disabled plugin {}", descriptor.identity());
            return;
        }

        self.registry.register_from(descriptor.clone(), source);
        let identity = descriptor.identity();
        self.enabled.retain(|d| d.identity() != identity);
        if !self.place_plugin(&descriptor) {
            return;
        }
        self.enabled.push(descriptor.clone());
        if descriptor.starts_at_boot() && self.state.reached(ShellState::PluginsBooted) {
            self.boot_one(&descriptor);
        }
    }

    pub fn add_hook(&mut self, hook: Box<dyn ConfigHook>) {
        self.hooks.push(hook);
    }

    /// Add names to the disabled list. Only takes effect before the enabled
    /// list is resolved.
    pub fn disable_plugins<S: AsRef<str>>(&mut self, names: &[S]) {
        if self.state.reached(ShellState::PluginsRegistered) {
            warn!("Plugins are already resolved; disabling has no effect until restart");
        }
        for name in names {
            let name = name.as_ref().trim().to_lowercase();
            if !name.is_empty() && !self.disabled.contains(&name) {
                self.disabled.push(name);
            }
        }
    }

    fn is_disabled(&self, module: &str) -> bool {
        let module = module.to_lowercase();
        self.disabled.iter().any(|d| *d == module)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Plugin activation
    // ─────────────────────────────────────────────────────────────────────

    pub fn start_global_plugin(&mut self, name: &str) -> Result<()> {
        if self.is_global_running(name) {
            debug!("Global plugin {} is already running", name);
            return Ok(());
        }
        let desc = self.find_enabled(name, PluginType::Global)?;
        let running = self.start_instance(&desc, None)?;
        self.globals.push(running);
        Ok(())
    }

    pub fn stop_global_plugin(&mut self, name: &str) -> Result<()> {
        let pos = self
            .globals
            .iter()
            .position(|p| p.descriptor.name() == name)
            .ok_or_else(|| Error::NotFound(format!("running global plugin '{}'", name)))?;
        let running = self.globals.remove(pos);
        self.stop_instance(running);
        Ok(())
    }

    /// Start the channel's own instance of a local plugin.
    pub fn start_local_plugin(&mut self, channel: &str, name: &str) -> Result<()> {
        if !self.channels.contains(channel) {
            return Err(ChannelError::NotFound(channel.to_string()).into());
        }
        if self.is_local_running(channel, name) {
            debug!("Local plugin {} is already running in {}", name, channel);
            return Ok(());
        }
        let desc = self.find_enabled(name, PluginType::Local)?;
        let running = self.start_instance(&desc, Some(channel))?;
        self.locals.push(running);
        Ok(())
    }

    pub fn stop_local_plugin(&mut self, channel: &str, name: &str) -> Result<()> {
        let pos = self
            .locals
            .iter()
            .position(|p| p.channel.as_deref() == Some(channel) && p.descriptor.name() == name)
            .ok_or_else(|| {
                Error::NotFound(format!("local plugin '{}' in channel '{}'", name, channel))
            })?;
        let running = self.locals.remove(pos);
        self.stop_instance(running);
        Ok(())
    }

    fn find_enabled(&self, name: &str, ptype: PluginType) -> Result<PluginDescriptor> {
        self.enabled
            .iter()
            .find(|d| d.ptype == ptype && d.name() == name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{} plugin '{}'", ptype, name)))
    }

    fn start_instance(
        &mut self,
        desc: &PluginDescriptor,
        channel: Option<&str>,
    ) -> Result<RunningPlugin> {
        let placement = self.placements.get(&desc.identity()).cloned();
        let workspace = placement
            .as_ref()
            .map(|p| p.workspace.clone())
            .unwrap_or_else(|| desc.workspace.clone());

        let mut instance = self.loader.load(desc)?;
        let ctx = PluginContext {
            name: desc.name().to_string(),
            ptype: desc.ptype,
            workspace: workspace.clone(),
            channel: channel.map(str::to_string),
            tasks: self.pool.clone(),
            ui: self.ui.clone(),
        };
        match catch_unwind(AssertUnwindSafe(|| instance.start(ctx))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(payload) => {
                return Err(Error::Plugin(format!(
                    "{} panicked while starting: {}",
                    desc.name(),
                    panic_message(payload.as_ref())
                )));
            }
        }

        let view = match channel {
            Some(channel) => format!("{}:{}", channel, desc.name()),
            None => desc.name().to_string(),
        };
        if let Err(e) = self.toolkit.add_view(&workspace, desc.tab_label(), &view) {
            warn!("No view for plugin {}: {}", view, e);
        }
        if let (Some(layout), Some(placement)) = (self.layout.as_mut(), placement) {
            layout.attach_view(placement.container, view.as_str());
        }

        let mut running = RunningPlugin {
            descriptor: desc.clone(),
            workspace,
            view,
            channel: channel.map(str::to_string),
            instance,
        };
        if let Some(active) = self.channels.active() {
            notify(&mut running, active);
        }
        debug!("Started plugin {}", running.view);
        Ok(running)
    }

    fn stop_instance(&mut self, mut running: RunningPlugin) {
        match catch_unwind(AssertUnwindSafe(|| running.instance.stop())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Error stopping plugin {}: {}", running.view, e),
            Err(payload) => error!(
                "Plugin {} panicked while stopping: {}",
                running.view,
                panic_message(payload.as_ref())
            ),
        }
        self.toolkit.remove_view(&running.workspace, &running.view);
        let container = self
            .placements
            .get(&running.descriptor.identity())
            .map(|p| p.container);
        if let (Some(layout), Some(container)) = (self.layout.as_mut(), container) {
            layout.detach_view(container, &running.view);
        }
        debug!("Stopped plugin {}", running.view);
    }

    pub fn is_global_running(&self, name: &str) -> bool {
        self.globals.iter().any(|p| p.descriptor.name() == name)
    }

    pub fn is_local_running(&self, channel: &str, name: &str) -> bool {
        self.locals
            .iter()
            .any(|p| p.channel.as_deref() == Some(channel) && p.descriptor.name() == name)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Channels
    // ─────────────────────────────────────────────────────────────────────

    fn queue_channel(&mut self, name: &str) {
        let name = name.trim();
        if !name.is_empty() && !self.pending_channels.iter().any(|n| n == name) {
            self.pending_channels.push(name.to_string());
        }
    }

    /// Add a channel. Before the channel phase the request is queued and
    /// `Ok(false)` is returned.
    pub fn add_channel(&mut self, name: &str) -> Result<bool> {
        if !self.state.reached(ShellState::PluginsBooted) {
            self.queue_channel(name);
            return Ok(false);
        }
        let was_empty = self.channels.is_empty();
        let created = self.channels.create(name)?;
        if created {
            self.attach_channel_view(name);
            if was_empty {
                self.channel_activated();
            }
        }
        Ok(created)
    }

    /// Add a channel named after the configured prefix and a counter.
    pub fn add_channel_auto(&mut self) -> String {
        let was_empty = self.channels.is_empty();
        let name = self.channels.auto_create();
        self.attach_channel_view(&name);
        if was_empty {
            self.channel_activated();
        }
        name
    }

    /// Make `name` the active channel and tell every running plugin.
    pub fn change_channel(&mut self, name: &str) -> Result<()> {
        if !self.state.reached(ShellState::PluginsBooted) {
            self.pending_activate = Some(name.to_string());
            return Ok(());
        }
        if self.channels.activate(name)? {
            self.channel_activated();
        }
        Ok(())
    }

    pub fn next_channel(&mut self) -> Result<()> {
        match self.channels.next_name().map(str::to_string) {
            Some(name) => self.change_channel(&name),
            None => Ok(()),
        }
    }

    pub fn prev_channel(&mut self) -> Result<()> {
        match self.channels.prev_name().map(str::to_string) {
            Some(name) => self.change_channel(&name),
            None => Ok(()),
        }
    }

    /// Remove a channel and stop its local plugins.
    pub fn delete_channel(&mut self, name: &str) -> Result<()> {
        if !self.channels.contains(name) {
            return Err(ChannelError::NotFound(name.to_string()).into());
        }
        let was_active = self.channels.active_name() == Some(name);

        let (stopping, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.locals)
            .into_iter()
            .partition(|p| p.channel.as_deref() == Some(name));
        self.locals = kept;
        for running in stopping.into_iter().rev() {
            self.stop_instance(running);
        }

        self.channels.delete(name)?;
        self.toolkit.remove_channel_view(name);
        info!("Deleted channel '{}'", name);
        if was_active {
            self.channel_activated();
        }
        Ok(())
    }

    fn attach_channel_view(&mut self, name: &str) {
        let Some(workspace) = self.channels.get(name).map(|c| c.workspace.clone()) else {
            return;
        };
        if let Err(e) = self.toolkit.add_channel_view(&workspace, name) {
            warn!("No view for channel '{}': {}", name, e);
        }
    }

    /// Highlight the active channel and broadcast it to running plugins.
    fn channel_activated(&mut self) {
        let Some(active) = self.channels.active() else {
            return;
        };
        self.toolkit.highlight_channel(&active.name);
        for running in self.globals.iter_mut().chain(self.locals.iter_mut()) {
            notify(running, active);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Files
    // ─────────────────────────────────────────────────────────────────────

    fn load_files(&mut self, files: &[String], separate: bool) {
        let expanded = expand_file_args(files);
        if expanded.is_empty() {
            return;
        }

        let existing: HashSet<String> = self.channels.names().into_iter().map(str::to_string).collect();
        let assignments = self.channels.assign(&expanded, separate);
        let created: Vec<String> = self
            .channels
            .names()
            .into_iter()
            .filter(|name| !existing.contains(*name))
            .map(str::to_string)
            .collect();
        for name in &created {
            self.attach_channel_view(name);
        }

        for (file, channel) in assignments {
            self.report.ok(format!("{} -> {}", file, channel), Phase::File);
            self.load_file(&file, &channel);
        }
    }

    /// Open `file` on the task pool and add it to `channel` when done.
    pub fn load_file(&self, file: &str, channel: &str) {
        let opener = self.opener.clone();
        let ui = self.ui.clone();
        let file = file.to_string();
        let channel = channel.to_string();
        let name = format!("load {}", file);

        self.pool.submit(Task::named(name, move || match opener.open(&file) {
            Ok(info) => {
                if !ui.gui_do(move |shell| shell.image_loaded(&channel, info)) {
                    debug!("Event loop gone; dropping {}", file);
                }
            }
            Err(e) => error!("Failed to load {}: {}", file, e),
        }));
    }

    /// Add a loaded image to its channel. Runs on the event-loop thread.
    pub fn image_loaded(&mut self, channel: &str, info: ImageInfo) {
        let Some(target) = self.channels.get_mut(channel) else {
            warn!("Channel '{}' is gone; dropping {}", channel, info.name);
            return;
        };
        if let Some(evicted) = target.add_image(info.name.clone()) {
            debug!("Channel '{}' is full; dropped {}", channel, evicted);
        }
        info!("Loaded {} into '{}'", info.name, channel);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Event loop
    // ─────────────────────────────────────────────────────────────────────

    /// Run UI callbacks until quit is requested or an interrupt arrives.
    /// Waits at most `poll` between checks of the quit flag.
    pub async fn mainloop(&mut self, poll: Duration) {
        let Some(mut events) = self.events.take() else {
            warn!("Event loop is already running");
            return;
        };

        info!("Entering mainloop...");
        let interrupt = shutdown_signal();
        tokio::pin!(interrupt);

        while !self.quit.is_set() {
            tokio::select! {
                callback = events.recv() => match callback {
                    Some(callback) => self.dispatch(callback),
                    None => break,
                },
                _ = &mut interrupt => {
                    self.quit();
                    break;
                }
                _ = tokio::time::sleep(poll) => {}
            }
        }

        self.events = Some(events);
        debug!("Left mainloop");
    }

    /// Run every queued UI callback without waiting. Returns how many ran.
    pub fn process_pending(&mut self) -> usize {
        let Some(mut events) = self.events.take() else {
            return 0;
        };
        let mut count = 0;
        while let Some(callback) = events.try_recv() {
            self.dispatch(callback);
            count += 1;
        }
        self.events = Some(events);
        count
    }

    fn dispatch(&mut self, callback: UiCallback) {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(self))) {
            error!("UI callback panicked: {}", panic_message(payload.as_ref()));
        }
    }

    pub fn quit(&self) {
        self.ui.quit();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Shutdown
    // ─────────────────────────────────────────────────────────────────────

    /// Stop the pool and every plugin, save the layout and close the UI.
    /// Calling it again is a no-op.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.state.reached(ShellState::ShuttingDown) {
            debug!("Shell is already shutting down");
            return Ok(());
        }
        self.quit();
        self.state.advance(ShellState::ShuttingDown)?;
        info!("Shutting down...");

        self.pool.shutdown();
        while let Some(running) = self.locals.pop() {
            self.stop_instance(running);
        }
        while let Some(running) = self.globals.pop() {
            self.stop_instance(running);
        }

        self.sync_geometry();
        if let (Some(path), Some(layout)) = (&self.layout_file, &self.layout) {
            if let Err(e) = save_layout(path, &layout.record()) {
                warn!("Cannot save layout: {}", e);
            }
        }

        self.toolkit.close();
        self.state.advance(ShellState::Stopped)?;
        info!("Shell stopped");
        Ok(())
    }

    /// Copy the toolkit's current container sizes into the layout.
    fn sync_geometry(&mut self) {
        let Some(layout) = self.layout.as_mut() else {
            return;
        };
        let named: Vec<(ContainerId, String)> = layout
            .containers()
            .iter()
            .filter_map(|c| c.name.clone().map(|name| (c.id, name)))
            .collect();
        for (id, name) in named {
            if let Some(hints) = self.toolkit.container_geometry(&name) {
                layout.set_hints(id, hints);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    pub fn state(&self) -> ShellState {
        self.state.current()
    }

    pub fn report(&self) -> &StartupReport {
        &self.report
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    /// Resolved plugin list, in registry order.
    pub fn enabled_plugins(&self) -> &[PluginDescriptor] {
        &self.enabled
    }

    pub fn disabled_plugins(&self) -> &[String] {
        &self.disabled
    }

    pub fn channels(&self) -> &ChannelManager {
        &self.channels
    }

    pub fn layout(&self) -> Option<&CompiledLayout> {
        self.layout.as_ref()
    }

    pub fn toolkit(&self) -> &dyn Toolkit {
        self.toolkit.as_ref()
    }

    pub fn running_globals(&self) -> Vec<&str> {
        self.globals.iter().map(|p| p.descriptor.name()).collect()
    }

    pub fn running_locals(&self, channel: &str) -> Vec<&str> {
        self.locals
            .iter()
            .filter(|p| p.channel.as_deref() == Some(channel))
            .map(|p| p.descriptor.name())
            .collect()
    }

    pub fn pool(&self) -> &Arc<ThreadPool> {
        &self.pool
    }

    pub fn ui_handle(&self) -> UiHandle {
        self.ui.clone()
    }

    pub fn quit_signal(&self) -> QuitSignal {
        self.quit.clone()
    }
}

fn notify(running: &mut RunningPlugin, channel: &crate::channel::Channel) {
    let result = catch_unwind(AssertUnwindSafe(|| running.instance.channel_changed(channel)));
    if let Err(payload) = result {
        error!(
            "Plugin {} panicked on channel change: {}",
            running.view,
            panic_message(payload.as_ref())
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{HeadlessState, HeadlessToolkit};
    use crate::plugin::{ViewPlugin, constructor};
    use crate::shell::Outcome;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn view_factory() -> crate::plugin::PluginConstructor {
        constructor(|desc| Ok(Box::new(ViewPlugin::new(desc)) as Box<dyn Plugin>))
    }

    fn build(
        defaults: DefaultPlugins,
        factories: FactoryTable,
    ) -> (ShellController, Arc<Mutex<HeadlessState>>) {
        let toolkit = HeadlessToolkit::new();
        let recorder = toolkit.recorder();
        let shell = ShellBuilder::new()
            .with_defaults(defaults)
            .with_factories(factories)
            .with_workers(2)
            .build(Box::new(toolkit))
            .unwrap();
        (shell, recorder)
    }

    fn reference_shell() -> (ShellController, Arc<Mutex<HeadlessState>>) {
        let toolkit = HeadlessToolkit::new();
        let recorder = toolkit.recorder();
        let shell = ShellBuilder::new()
            .with_workers(2)
            .build(Box::new(toolkit))
            .unwrap();
        (shell, recorder)
    }

    /// Records every channel it is told about and counts stops
    struct Watcher {
        seen: Arc<Mutex<Vec<String>>>,
        stops: Arc<AtomicUsize>,
    }

    impl Plugin for Watcher {
        fn start(&mut self, _ctx: PluginContext) -> Result<()> {
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn channel_changed(&mut self, channel: &crate::channel::Channel) {
            self.seen.lock().push(channel.name.clone());
        }
    }

    fn watcher_shell() -> (ShellController, Arc<Mutex<Vec<String>>>, Arc<AtomicUsize>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let stops = Arc::new(AtomicUsize::new(0));
        let defaults = DefaultPlugins::from_descriptors(vec![
            PluginDescriptor::global("Watcher", "right").with_start(true),
            PluginDescriptor::local("Cuts", "dialogs"),
        ]);
        let mut factories = FactoryTable::new("test");
        let (seen_c, stops_c) = (seen.clone(), stops.clone());
        factories.insert(
            "Watcher",
            constructor(move |_| {
                Ok(Box::new(Watcher {
                    seen: seen_c.clone(),
                    stops: stops_c.clone(),
                }) as Box<dyn Plugin>)
            }),
        );
        factories.insert("Cuts", view_factory());
        let (shell, _) = build(defaults, factories);
        (shell, seen, stops)
    }

    #[test]
    fn test_startup_creates_default_channel() {
        let (mut shell, recorder) = reference_shell();
        shell.startup(&StartupPlan::default()).unwrap();

        assert_eq!(shell.state(), ShellState::Running);
        assert_eq!(shell.channels().names(), vec!["Image"]);
        assert_eq!(shell.channels().active_name(), Some("Image"));

        let state = recorder.lock();
        assert!(state.built);
        assert_eq!(state.highlighted.as_deref(), Some("Image"));
        assert_eq!(state.title.as_deref(), Some("refview"));
        assert!(state.raised.iter().any(|t| t == "Thumbs"));
        // hidden boot plugins get no menu entry
        assert!(!state.menus.iter().any(|(_, label)| label == "Pan"));
        assert!(state.menus.iter().any(|(_, label)| label == "Blink Channels [G]"));
        drop(state);

        assert_eq!(shell.running_globals().len(), 9);
        assert!(shell.report().is_clean());
    }

    #[test]
    fn test_boot_failure_is_isolated() {
        let defaults = DefaultPlugins::from_descriptors(vec![
            PluginDescriptor::global("Alpha", "right").with_start(true),
            PluginDescriptor::global("Broken", "right").with_start(true),
            PluginDescriptor::global("Gamma", "uleft").with_start(true),
            PluginDescriptor::global("Lazy", "right"),
        ]);
        let mut factories = FactoryTable::new("test");
        factories.insert("Alpha", view_factory());
        factories.insert(
            "Broken",
            constructor(|_| Err(Error::Plugin("no display".to_string()))),
        );
        factories.insert("Gamma", view_factory());
        factories.insert("Lazy", view_factory());

        let (mut shell, recorder) = build(defaults, factories);
        shell.startup(&StartupPlan::default()).unwrap();

        assert_eq!(shell.state(), ShellState::Running);
        assert_eq!(shell.running_globals(), vec!["Alpha", "Gamma"]);
        let failures: Vec<_> = shell.report().failures().collect();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].subject.contains("Broken"));
        assert_eq!(failures[0].phase, Phase::Load);

        let views = recorder.lock().views.clone();
        assert_eq!(views.len(), 2);
        assert!(!views.iter().any(|(_, _, p)| p == "Lazy"));
    }

    #[test]
    fn test_start_panic_is_isolated() {
        struct Explodes;
        impl Plugin for Explodes {
            fn start(&mut self, _ctx: PluginContext) -> Result<()> {
                panic!("boom");
            }
        }

        let defaults = DefaultPlugins::from_descriptors(vec![
            PluginDescriptor::global("Explodes", "right").with_start(true),
            PluginDescriptor::global("Alpha", "right").with_start(true),
        ]);
        let mut factories = FactoryTable::new("test");
        factories.insert("Explodes", constructor(|_| Ok(Box::new(Explodes) as Box<dyn Plugin>)));
        factories.insert("Alpha", view_factory());

        let (mut shell, _) = build(defaults, factories);
        shell.startup(&StartupPlan::default()).unwrap();

        assert_eq!(shell.running_globals(), vec!["Alpha"]);
        let failure = shell.report().failures().next().unwrap();
        assert_eq!(failure.phase, Phase::Start);
        assert!(matches!(&failure.outcome, Outcome::Failed(reason) if reason.contains("boom")));
    }

    #[test]
    fn test_disabled_plugins_are_not_enabled() {
        let defaults = DefaultPlugins::from_descriptors(vec![
            PluginDescriptor::global("A", "right").with_start(true),
            PluginDescriptor::local("B", "dialogs"),
        ]);
        let mut factories = FactoryTable::new("test");
        factories.insert("A", view_factory());
        factories.insert("B", view_factory());

        let (mut shell, recorder) = build(defaults, factories);
        let plan = StartupPlan {
            disabled: vec!["b".to_string()],
            ..Default::default()
        };
        shell.startup(&plan).unwrap();

        let names: Vec<&str> = shell.enabled_plugins().iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["A"]);
        assert!(recorder.lock().operations.is_empty());
    }

    #[test]
    fn test_command_line_plugins_override_saved() {
        let (mut shell, _) = reference_shell();
        shell.loader.add_user("acme.Stars", view_factory());
        let plan = StartupPlan {
            saved_global_plugins: vec!["acme.Stars".to_string()],
            global_plugins: vec!["acme.Stars".to_string()],
            local_plugins: vec!["Stacker".to_string()],
            ..Default::default()
        };
        shell.startup(&plan).unwrap();

        let stars: Vec<_> = shell
            .registry()
            .iter()
            .filter(|r| r.descriptor.module == "Stars")
            .collect();
        assert_eq!(stars.len(), 1);
        assert_eq!(stars[0].source, PluginSource::CommandLine);
        assert_eq!(stars[0].descriptor.namespace_prefix.as_deref(), Some("acme"));
        assert!(shell.is_global_running("Stars"));

        // No constructor for Stacker, but it is still listed
        assert!(shell.enabled_plugins().iter().any(|d| d.name() == "Stacker"));
    }

    #[test]
    fn test_separate_channels_get_one_file_each() {
        let temp = TempDir::new().unwrap();
        let files: Vec<String> = ["a.fits", "b.fits", "c.fits"]
            .iter()
            .map(|name| {
                let path = temp.path().join(name);
                std::fs::write(&path, b"SIMPLE").unwrap();
                path.display().to_string()
            })
            .collect();

        let (mut shell, _) = reference_shell();
        let plan = StartupPlan {
            channels: vec!["Sky".into(), "Deep".into(), "Wide".into()],
            files,
            separate_channels: true,
            ..Default::default()
        };
        shell.startup(&plan).unwrap();
        assert_eq!(shell.channels().names(), vec!["Sky", "Deep", "Wide"]);
        assert_eq!(shell.channels().active_name(), Some("Sky"));

        for _ in 0..500 {
            shell.process_pending();
            if shell.channels().iter().all(|c| c.current_image().is_some()) {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        let current: Vec<_> = shell
            .channels()
            .iter()
            .map(|c| c.current_image().unwrap_or_default().to_string())
            .collect();
        assert_eq!(current, vec!["a.fits", "b.fits", "c.fits"]);
        assert_eq!(shell.report().in_phase(Phase::File).count(), 3);
    }

    #[test]
    fn test_files_go_to_active_channel_without_sep() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("m31.fits");
        std::fs::write(&path, b"SIMPLE").unwrap();

        let (mut shell, recorder) = reference_shell();
        let plan = StartupPlan {
            channels: vec!["Sky".into(), "Deep".into()],
            files: vec![path.display().to_string(), path.display().to_string()],
            show_banner: true,
            ..Default::default()
        };
        shell.startup(&plan).unwrap();

        for _ in 0..500 {
            shell.process_pending();
            if shell.channels().get("Sky").unwrap().images.len() == 2 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(shell.channels().get("Sky").unwrap().images.len(), 2);
        assert!(shell.channels().get("Deep").unwrap().images.is_empty());
        // files on the command line suppress the banner
        assert_eq!(recorder.lock().banner, None);
    }

    #[test]
    fn test_banner_is_shown_once_and_saved() {
        let temp = TempDir::new().unwrap();
        let prefs = Preferences::open(temp.path());
        let toolkit = HeadlessToolkit::new();
        let recorder = toolkit.recorder();
        let mut shell = ShellBuilder::new()
            .with_workers(1)
            .with_preferences(prefs, GeneralSettings::default())
            .build(Box::new(toolkit))
            .unwrap();

        let plan = StartupPlan {
            show_banner: true,
            ..Default::default()
        };
        shell.startup(&plan).unwrap();

        assert_eq!(recorder.lock().banner.as_deref(), Some("Image"));
        let saved = Preferences::open(temp.path()).load_general();
        assert!(!saved.show_banner);
    }

    #[test]
    fn test_channel_changes_are_broadcast() {
        let (mut shell, seen, _) = watcher_shell();
        let plan = StartupPlan {
            channels: vec!["Sky".into(), "Deep".into()],
            ..Default::default()
        };
        shell.startup(&plan).unwrap();
        assert_eq!(seen.lock().last().map(String::as_str), Some("Sky"));

        shell.change_channel("Deep").unwrap();
        assert_eq!(seen.lock().last().map(String::as_str), Some("Deep"));

        shell.next_channel().unwrap();
        assert_eq!(shell.channels().active_name(), Some("Sky"));

        assert!(matches!(
            shell.change_channel("Nope"),
            Err(Error::Channel(ChannelError::NotFound(_)))
        ));
        assert_eq!(shell.channels().active_name(), Some("Sky"));
    }

    #[test]
    fn test_local_plugins_per_channel() {
        let (mut shell, _, _) = watcher_shell();
        let plan = StartupPlan {
            channels: vec!["Sky".into(), "Deep".into()],
            ..Default::default()
        };
        shell.startup(&plan).unwrap();

        shell.start_local_plugin("Sky", "Cuts").unwrap();
        shell.start_local_plugin("Sky", "Cuts").unwrap();
        shell.start_local_plugin("Deep", "Cuts").unwrap();
        assert_eq!(shell.running_locals("Sky"), vec!["Cuts"]);
        assert_eq!(shell.running_locals("Deep"), vec!["Cuts"]);

        assert!(matches!(
            shell.start_local_plugin("Nope", "Cuts"),
            Err(Error::Channel(ChannelError::NotFound(_)))
        ));
        assert!(matches!(
            shell.start_local_plugin("Sky", "Pick"),
            Err(Error::NotFound(_))
        ));

        shell.stop_local_plugin("Deep", "Cuts").unwrap();
        assert!(shell.running_locals("Deep").is_empty());
        assert!(shell.stop_local_plugin("Deep", "Cuts").is_err());

        shell.delete_channel("Sky").unwrap();
        assert!(!shell.is_local_running("Sky", "Cuts"));
        assert_eq!(shell.channels().active_name(), Some("Deep"));
    }

    #[test]
    fn test_global_activation() {
        let (mut shell, _, stops) = watcher_shell();
        shell.startup(&StartupPlan::default()).unwrap();
        assert!(shell.is_global_running("Watcher"));

        shell.stop_global_plugin("Watcher").unwrap();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert!(!shell.is_global_running("Watcher"));

        shell.start_global_plugin("Watcher").unwrap();
        shell.start_global_plugin("Watcher").unwrap();
        assert_eq!(shell.running_globals(), vec!["Watcher"]);
        assert!(matches!(
            shell.start_global_plugin("Cuts"),
            Err(Error::NotFound(_))
        ));
    }

    struct Failing;
    impl ConfigHook for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn before_ui(&self, _shell: &mut ShellController) -> Result<()> {
            Err(Error::Other("bad hook".to_string()))
        }
    }

    struct Panicking;
    impl ConfigHook for Panicking {
        fn after_ui(&self, _shell: &mut ShellController) -> Result<()> {
            panic!("hook exploded");
        }
    }

    struct Adding;
    impl ConfigHook for Adding {
        fn before_ui(&self, shell: &mut ShellController) -> Result<()> {
            shell.register_plugin(
                PluginDescriptor::global("Cuts", "right").with_start(true),
                PluginSource::ConfigHook,
            );
            shell.add_channel("Deep")?;
            Ok(())
        }

        fn after_ui(&self, shell: &mut ShellController) -> Result<()> {
            shell.disable_plugins(&["Pick"]);
            Ok(())
        }

        fn after_channels(&self, shell: &mut ShellController) -> Result<()> {
            shell.change_channel("Deep")
        }
    }

    #[test]
    fn test_hooks_are_isolated() {
        let toolkit = HeadlessToolkit::new();
        let mut shell = ShellBuilder::new()
            .with_workers(1)
            .with_hook(Box::new(Failing))
            .with_hook(Box::new(Panicking))
            .with_hook(Box::new(Adding))
            .build(Box::new(toolkit))
            .unwrap();
        shell.loader.add_user("Cuts", view_factory());

        let plan = StartupPlan {
            channels: vec!["Sky".into()],
            ..Default::default()
        };
        shell.startup(&plan).unwrap();

        assert_eq!(shell.state(), ShellState::Running);
        let hook_failures: Vec<_> = shell
            .report()
            .failures()
            .filter(|e| e.phase == Phase::Hook)
            .collect();
        assert_eq!(hook_failures.len(), 2);
        assert_eq!(hook_failures[0].subject, "failing before_ui");
        assert_eq!(hook_failures[1].subject, "config hook after_ui");

        assert!(shell.is_global_running("Cuts"));
        assert!(!shell.enabled_plugins().iter().any(|d| d.module == "Pick"));
        assert_eq!(shell.channels().names(), vec!["Sky", "Deep"]);
        assert_eq!(shell.channels().active_name(), Some("Deep"));
    }

    #[test]
    fn test_late_registration_is_placed() {
        let (mut shell, recorder) = reference_shell();
        shell.loader.add_user("Stars", view_factory());
        shell.startup(&StartupPlan::default()).unwrap();

        shell.register_plugin(
            PluginDescriptor::global("Stars", "nowhere")
                .with_group(2)
                .with_start(true),
            PluginSource::Embedder,
        );
        assert!(shell.is_global_running("Stars"));

        let layout = shell.layout().unwrap();
        let fallback = layout.place("nowhere", Some(2)).unwrap();
        let workspace = layout.get(fallback).unwrap().name.clone().unwrap();
        let views = recorder.lock().views.clone();
        assert!(views.iter().any(|(ws, _, p)| *ws == workspace && p == "Stars"));
    }

    #[test]
    fn test_shutdown_stops_plugins_and_saves_layout() {
        let temp = TempDir::new().unwrap();
        let layout_file = temp.path().join("layout");
        let toolkit = HeadlessToolkit::new();
        let recorder = toolkit.recorder();
        let mut shell = ShellBuilder::new()
            .with_workers(2)
            .with_layout_file(Some(layout_file.clone()))
            .build(Box::new(toolkit))
            .unwrap();

        shell.startup(&StartupPlan::default()).unwrap();
        shell.shutdown().unwrap();

        assert_eq!(shell.state(), ShellState::Stopped);
        assert!(shell.running_globals().is_empty());
        assert!(shell.pool().is_shut_down());
        assert!(layout_file.exists());
        let state = recorder.lock();
        assert!(state.closed);
        assert!(state.views.is_empty());
        drop(state);

        shell.shutdown().unwrap();
        assert!(shell.startup(&StartupPlan::default()).is_err());
    }

    #[test]
    fn test_window_geometry_survives_restart() {
        use crate::layout::{SizeHints, load_saved_layout};

        let temp = TempDir::new().unwrap();
        let layout_file = temp.path().join("layout");
        let layout_shell = |toolkit: HeadlessToolkit| {
            ShellBuilder::new()
                .with_workers(1)
                .with_layout_file(Some(layout_file.clone()))
                .build(Box::new(toolkit))
                .unwrap()
        };

        let toolkit = HeadlessToolkit::new();
        let recorder = toolkit.recorder();
        let mut shell = layout_shell(toolkit);
        let plan = StartupPlan {
            geometry: Some("1024x768+10+20".to_string()),
            ..Default::default()
        };
        shell.startup(&plan).unwrap();
        // The user drags the right pane wider
        recorder
            .lock()
            .sizes
            .insert("right".to_string(), SizeHints::new(Some(520), Some(-1)));
        shell.shutdown().unwrap();

        let saved = load_saved_layout(&layout_file).unwrap();
        assert_eq!(
            saved.find("top").unwrap().hints(),
            SizeHints::new(Some(1024), Some(768))
        );
        assert_eq!(
            saved.find("right").unwrap().hints(),
            SizeHints::new(Some(520), Some(-1))
        );

        let mut shell = layout_shell(HeadlessToolkit::new());
        shell.startup(&StartupPlan::default()).unwrap();
        let layout = shell.layout().unwrap();
        assert_eq!(
            layout.by_name("top").unwrap().hints,
            SizeHints::new(Some(1024), Some(768))
        );
        assert_eq!(
            layout.by_name("right").unwrap().hints,
            SizeHints::new(Some(520), Some(-1))
        );
        shell.shutdown().unwrap();
    }

    #[test]
    fn test_small_recursion_limit_falls_back_to_default_depth() {
        let mut shell = ShellBuilder::new()
            .with_workers(1)
            .with_max_depth(4)
            .build(Box::new(HeadlessToolkit::new()))
            .unwrap();

        shell.startup(&StartupPlan::default()).unwrap();
        assert_eq!(shell.state(), ShellState::Running);
        assert!(shell.layout().unwrap().workspace("channels").is_some());
        assert!(shell.report().is_clean());
        shell.shutdown().unwrap();
    }

    fn external_points(builds: Arc<AtomicUsize>) -> ExtensionPoints {
        let mut points = ExtensionPoints::new();
        points.register(PLUGIN_GROUP, "acme-spectra", move || {
            let builds = builds.clone();
            Ok(crate::plugin::ExternalPlugin {
                descriptor: PluginDescriptor::global("Spectra", "right")
                    .with_tab("Spectra")
                    .with_start(true),
                constructor: constructor(move |desc| {
                    builds.fetch_add(1, Ordering::SeqCst);
                    Ok(Box::new(ViewPlugin::new(desc)) as Box<dyn Plugin>)
                }),
            })
        });
        points.register(PLUGIN_GROUP, "acme-broken", || {
            Err(Error::Plugin("missing dependency".into()))
        });
        points
    }

    #[test]
    fn test_external_plugins_boot_and_yield_to_saved() {
        let builds = Arc::new(AtomicUsize::new(0));
        let mut shell = ShellBuilder::new()
            .with_workers(1)
            .with_extensions(external_points(builds.clone()))
            .build(Box::new(HeadlessToolkit::new()))
            .unwrap();
        let spectra = PluginDescriptor::global("Spectra", "right").identity();
        assert_eq!(
            shell.registry().get(&spectra).unwrap().source,
            PluginSource::External
        );
        assert!(!shell.registry().iter().any(|p| p.descriptor.module == "Broken"));

        shell.startup(&StartupPlan::default()).unwrap();
        assert!(shell.is_global_running("Spectra"));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        shell.shutdown().unwrap();

        // A saved entry with the same identity takes over the descriptor
        let builds = Arc::new(AtomicUsize::new(0));
        let mut shell = ShellBuilder::new()
            .with_workers(1)
            .with_extensions(external_points(builds.clone()))
            .build(Box::new(HeadlessToolkit::new()))
            .unwrap();
        let plan = StartupPlan {
            saved_global_plugins: vec!["Spectra".to_string()],
            ..Default::default()
        };
        shell.startup(&plan).unwrap();

        let entry = shell.registry().get(&spectra).unwrap();
        assert_eq!(entry.source, PluginSource::Saved);
        assert_eq!(entry.descriptor.menu.as_deref(), Some("Spectra [G]"));
        assert_eq!(
            shell
                .enabled_plugins()
                .iter()
                .filter(|d| d.module == "Spectra")
                .count(),
            1
        );
        assert!(shell.is_global_running("Spectra"));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(shell.report().is_clean());
        shell.shutdown().unwrap();
    }

    /// Fires the interrupt from inside a hook, then waits for the watcher
    struct InterruptingHook {
        fire: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
    }

    impl ConfigHook for InterruptingHook {
        fn before_ui(&self, shell: &mut ShellController) -> Result<()> {
            if let Some(fire) = self.fire.lock().take() {
                let _ = fire.send(());
            }
            let quit = shell.quit_signal();
            let deadline = std::time::Instant::now() + Duration::from_secs(5);
            while !quit.is_set() && std::time::Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(1));
            }
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_interrupt_during_startup_shuts_down_cleanly() {
        let (fire, fired) = tokio::sync::oneshot::channel();
        let mut shell = ShellBuilder::new()
            .with_workers(1)
            .with_hook(Box::new(InterruptingHook {
                fire: Mutex::new(Some(fire)),
            }))
            .build(Box::new(HeadlessToolkit::new()))
            .unwrap();
        let watcher = crate::shell::watch_interrupt(
            &tokio::runtime::Handle::current(),
            async move {
                let _ = fired.await;
            },
            shell.ui_handle(),
        );

        shell.startup(&StartupPlan::default()).unwrap();
        assert_eq!(shell.state(), ShellState::Init);
        assert!(shell.layout().is_none());
        watcher.await.unwrap();

        shell.shutdown().unwrap();
        assert_eq!(shell.state(), ShellState::Stopped);
    }

    #[test]
    fn test_quit_during_startup_still_shuts_down() {
        let (mut shell, _) = reference_shell();
        shell.quit();
        shell.startup(&StartupPlan::default()).unwrap();
        assert_eq!(shell.state(), ShellState::Init);
        assert!(shell.running_globals().is_empty());

        shell.shutdown().unwrap();
        assert_eq!(shell.state(), ShellState::Stopped);
    }

    #[tokio::test]
    async fn test_mainloop_runs_callbacks_until_quit() {
        let (mut shell, _) = reference_shell();
        shell.startup(&StartupPlan::default()).unwrap();

        let ui = shell.ui_handle();
        let worker = std::thread::spawn(move || {
            ui.gui_do(|shell| {
                shell.add_channel("Late").unwrap();
            });
            ui.gui_do(|_| panic!("bad callback"));
            ui.gui_do(|shell| shell.quit());
        });
        worker.join().unwrap();

        shell.mainloop(Duration::from_millis(10)).await;
        assert!(shell.quit_signal().is_set());
        assert!(shell.channels().contains("Late"));

        shell.shutdown().unwrap();
        assert_eq!(shell.state(), ShellState::Stopped);
    }
}
