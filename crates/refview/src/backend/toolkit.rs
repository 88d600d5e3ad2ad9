// Toolkit - the rendering backend seam
//
// The shell never touches widgets directly. It talks to a `Toolkit`, chosen
// once at startup before any UI exists and injected into the controller.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::layout::{CompiledLayout, SizeHints};
use crate::types::{Error, Result};

use super::geometry::Geometry;

// ─────────────────────────────────────────────────────────────────────────────
// Toolkit Trait
// ─────────────────────────────────────────────────────────────────────────────

pub trait Toolkit: Send {
    fn name(&self) -> &str;

    /// Toolkit family, e.g. the widget library behind a versioned binding
    fn family(&self) -> &str;

    /// Create the top-level windows and every container of the layout.
    fn build_toplevel(&mut self, layout: &CompiledLayout) -> Result<()>;

    fn set_geometry(&mut self, geometry: &Geometry) -> Result<()>;

    /// Current size of a named container, as the user left it.
    fn container_geometry(&self, name: &str) -> Option<SizeHints>;

    fn set_title(&mut self, title: &str);

    /// Put a plugin's view into a workspace under a tab title.
    fn add_view(&mut self, workspace: &str, title: &str, plugin: &str) -> Result<()>;

    fn remove_view(&mut self, workspace: &str, plugin: &str);

    /// Bring the tab with this title to the front. Returns false if there is
    /// no such tab.
    fn raise_tab(&mut self, title: &str) -> bool;

    fn add_menu_entry(&mut self, category: &str, label: &str);

    /// List a local plugin in the operations menu.
    fn add_operation(&mut self, category: &str, name: &str);

    fn add_channel_view(&mut self, workspace: &str, channel: &str) -> Result<()>;

    fn remove_channel_view(&mut self, channel: &str);

    fn highlight_channel(&mut self, channel: &str);

    /// Show the welcome banner in a channel.
    fn show_banner(&mut self, channel: &str);

    fn close(&mut self);
}

type ToolkitFactory = Box<dyn Fn() -> Result<Box<dyn Toolkit>> + Send + Sync>;

struct ToolkitEntry {
    name: String,
    factory: ToolkitFactory,
}

/// Known toolkits, in preference order for `choose`.
#[derive(Default)]
pub struct ToolkitRegistry {
    entries: Vec<ToolkitEntry>,
}

impl ToolkitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the toolkits compiled into this binary.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("headless", || Ok(Box::new(HeadlessToolkit::new()) as Box<dyn Toolkit>));
        registry
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Result<Box<dyn Toolkit>> + Send + Sync + 'static,
    {
        self.entries.push(ToolkitEntry {
            name: name.to_string(),
            factory: Box::new(factory),
        });
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Instantiate the preferred toolkit. `choose` takes the first one that
    /// starts.
    pub fn select(&self, preference: &str) -> Result<Box<dyn Toolkit>> {
        let preference = preference.trim();
        if preference.is_empty() || preference.eq_ignore_ascii_case("choose") {
            for entry in &self.entries {
                match (entry.factory)() {
                    Ok(toolkit) => return Ok(toolkit),
                    Err(e) => tracing::debug!("Toolkit {} is not usable: {}", entry.name, e),
                }
            }
            return Err(Error::Toolkit("no usable toolkit found".to_string()));
        }

        let entry = self
            .entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(preference))
            .ok_or_else(|| {
                Error::Toolkit(format!(
                    "unknown toolkit '{}' (available: {})",
                    preference,
                    self.names().join(", ")
                ))
            })?;
        (entry.factory)()
            .map_err(|e| Error::Toolkit(format!("cannot start toolkit '{}': {}", entry.name, e)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Headless Toolkit
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the headless toolkit has been asked to show
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadlessState {
    pub built: bool,
    pub workspaces: Vec<String>,
    /// Name of the first top-level container
    pub toplevel: Option<String>,
    /// Current size of every named container
    pub sizes: BTreeMap<String, SizeHints>,
    pub geometry: Option<Geometry>,
    pub title: Option<String>,
    /// (workspace, tab title, plugin)
    pub views: Vec<(String, String, String)>,
    pub raised: Vec<String>,
    /// (category, label)
    pub menus: Vec<(String, String)>,
    pub operations: Vec<(String, String)>,
    /// (workspace, channel)
    pub channel_views: Vec<(String, String)>,
    pub highlighted: Option<String>,
    pub banner: Option<String>,
    pub closed: bool,
}

/// Toolkit without a display. It keeps a record of every request, which is
/// what batch runs and tests need.
#[derive(Debug, Clone, Default)]
pub struct HeadlessToolkit {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared view of the recorded state
    pub fn recorder(&self) -> Arc<Mutex<HeadlessState>> {
        self.state.clone()
    }

    fn require_workspace(state: &HeadlessState, workspace: &str) -> Result<()> {
        if !state.built {
            return Err(Error::Toolkit("toplevel not built yet".to_string()));
        }
        if !state.workspaces.iter().any(|w| w == workspace) {
            return Err(Error::NotFound(format!("workspace '{}'", workspace)));
        }
        Ok(())
    }
}

impl Toolkit for HeadlessToolkit {
    fn name(&self) -> &str {
        "headless"
    }

    fn family(&self) -> &str {
        "headless"
    }

    fn build_toplevel(&mut self, layout: &CompiledLayout) -> Result<()> {
        let mut state = self.state.lock();
        state.workspaces = layout
            .workspaces()
            .filter_map(|ws| ws.name.clone())
            .collect();
        state.sizes = layout
            .containers()
            .iter()
            .filter_map(|c| c.name.clone().map(|name| (name, c.hints)))
            .collect();
        state.toplevel = layout
            .toplevels()
            .first()
            .and_then(|&id| layout.get(id))
            .and_then(|c| c.name.clone());
        state.built = true;
        tracing::debug!("Built toplevel with {} workspaces", state.workspaces.len());
        Ok(())
    }

    fn set_geometry(&mut self, geometry: &Geometry) -> Result<()> {
        let mut state = self.state.lock();
        state.geometry = Some(*geometry);
        if let (Some(hints), Some(top)) = (geometry.size_hints(), state.toplevel.clone()) {
            state.sizes.insert(top, hints);
        }
        Ok(())
    }

    fn container_geometry(&self, name: &str) -> Option<SizeHints> {
        self.state.lock().sizes.get(name).copied()
    }

    fn set_title(&mut self, title: &str) {
        self.state.lock().title = Some(title.to_string());
    }

    fn add_view(&mut self, workspace: &str, title: &str, plugin: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::require_workspace(&state, workspace)?;
        state
            .views
            .push((workspace.to_string(), title.to_string(), plugin.to_string()));
        Ok(())
    }

    fn remove_view(&mut self, workspace: &str, plugin: &str) {
        self.state
            .lock()
            .views
            .retain(|(ws, _, p)| !(ws == workspace && p == plugin));
    }

    fn raise_tab(&mut self, title: &str) -> bool {
        let mut state = self.state.lock();
        let exists = state.views.iter().any(|(_, t, _)| t == title)
            || state.channel_views.iter().any(|(_, ch)| ch == title);
        if exists {
            state.raised.push(title.to_string());
        }
        exists
    }

    fn add_menu_entry(&mut self, category: &str, label: &str) {
        self.state
            .lock()
            .menus
            .push((category.to_string(), label.to_string()));
    }

    fn add_operation(&mut self, category: &str, name: &str) {
        self.state
            .lock()
            .operations
            .push((category.to_string(), name.to_string()));
    }

    fn add_channel_view(&mut self, workspace: &str, channel: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::require_workspace(&state, workspace)?;
        state
            .channel_views
            .push((workspace.to_string(), channel.to_string()));
        Ok(())
    }

    fn remove_channel_view(&mut self, channel: &str) {
        self.state.lock().channel_views.retain(|(_, ch)| ch != channel);
    }

    fn highlight_channel(&mut self, channel: &str) {
        self.state.lock().highlighted = Some(channel.to_string());
    }

    fn show_banner(&mut self, channel: &str) {
        self.state.lock().banner = Some(channel.to_string());
    }

    fn close(&mut self) {
        self.state.lock().closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{LayoutCompiler, default_layout};

    #[test]
    fn test_select_named_and_choose() {
        let registry = ToolkitRegistry::with_builtin();
        assert_eq!(registry.select("headless").unwrap().name(), "headless");
        assert_eq!(registry.select("HEADLESS").unwrap().name(), "headless");
        assert_eq!(registry.select("choose").unwrap().family(), "headless");
    }

    #[test]
    fn test_select_unknown_is_toolkit_error() {
        let registry = ToolkitRegistry::with_builtin();
        let err = registry.select("qt5").err().unwrap();
        assert!(matches!(err, Error::Toolkit(_)));
        assert!(err.to_string().contains("headless"));
    }

    #[test]
    fn test_choose_skips_failing_toolkits() {
        let mut registry = ToolkitRegistry::new();
        registry.register("gtk3", || Err(Error::Toolkit("no display".into())));
        assert!(registry.select("choose").is_err());
        assert!(matches!(registry.select("gtk3"), Err(Error::Toolkit(_))));

        registry.register("headless", || Ok(Box::new(HeadlessToolkit::new()) as Box<dyn Toolkit>));
        assert_eq!(registry.select("choose").unwrap().name(), "headless");
    }

    #[test]
    fn test_headless_records_requests() {
        let mut toolkit = HeadlessToolkit::new();
        let recorder = toolkit.recorder();
        assert!(toolkit.add_view("right", "Zoom", "Zoom").is_err());

        let layout = LayoutCompiler::new(default_layout()).compile().unwrap();
        toolkit.build_toplevel(&layout).unwrap();
        toolkit.add_view("right", "Zoom", "Zoom").unwrap();
        assert!(toolkit.add_view("nowhere", "Zoom", "Zoom").is_err());
        assert!(toolkit.raise_tab("Zoom"));
        assert!(!toolkit.raise_tab("Thumbs"));

        toolkit.set_geometry(&"1024x768".parse().unwrap()).unwrap();
        assert_eq!(
            toolkit.container_geometry("top"),
            Some(SizeHints::new(Some(1024), Some(768)))
        );
        assert_eq!(
            toolkit.container_geometry("right"),
            Some(SizeHints::new(Some(400), Some(-1)))
        );
        assert_eq!(toolkit.container_geometry("nowhere"), None);

        let state = recorder.lock();
        assert_eq!(state.workspaces.len(), 10);
        assert_eq!(state.views.len(), 1);
        assert_eq!(state.raised, vec!["Zoom"]);
    }
}
