//! Built-in plugin set
//!
//! The default descriptors are an immutable value handed to the registry at
//! startup. Nothing mutates it in place; embedders derive filtered copies.

use super::descriptor::{PluginDescriptor, PluginType};

/// Immutable list of default plugin descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultPlugins {
    descriptors: Vec<PluginDescriptor>,
}

impl DefaultPlugins {
    /// No default plugins at all.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_descriptors(descriptors: Vec<PluginDescriptor>) -> Self {
        Self { descriptors }
    }

    /// The reference viewer's plugin set.
    pub fn reference() -> Self {
        let system = |module: &str, workspace: &str| {
            PluginDescriptor::global(module, workspace)
                .with_start(true)
                .with_hidden(true)
                .with_category("System")
        };
        let optional = |module: &str, tab: &str, workspace: &str, menu: &str, category: &str| {
            PluginDescriptor::global(module, workspace)
                .with_tab(tab)
                .with_menu(menu)
                .with_category(category)
        };
        let local = |module: &str, category: &str| {
            PluginDescriptor::local(module, "dialogs").with_category(category)
        };

        let descriptors = vec![
            // hidden plugins, started at program initialization
            system("Operations", "operations"),
            system("Toolbar", "toolbar"),
            system("Pan", "uleft"),
            system("Info", "lleft").with_tab("Synopsis"),
            system("Thumbs", "right").with_tab("Thumbs"),
            system("Contents", "right").with_tab("Contents"),
            system("Colorbar", "cbar"),
            system("Cursor", "readout"),
            system("Errors", "right").with_tab("Errors"),
            // optional, user-started plugins
            optional("Blink", "Blink Channels", "right", "Blink Channels [G]", "Analysis"),
            local("Blink", "Analysis").with_menu("Blink Images"),
            local("Cuts", "Analysis"),
            local("LineProfile", "Analysis.Datacube"),
            local("Histogram", "Analysis"),
            local("Overlays", "Analysis"),
            local("Pick", "Analysis"),
            local("PixTable", "Analysis"),
            local("TVMark", "Analysis"),
            local("TVMask", "Analysis"),
            optional("WCSMatch", "WCSMatch", "right", "WCS Match [G]", "Analysis"),
            optional("Command", "Command", "lleft", "Command Line [G]", "Debug"),
            optional("Log", "Log", "right", "Logger Info [G]", "Debug"),
            PluginDescriptor::local("MultiDim", "lleft").with_category("Navigation"),
            optional("RC", "RC", "right", "Remote Control [G]", "Remote"),
            optional("SAMP", "SAMP", "right", "SAMP Client [G]", "Remote"),
            local("Compose", "RGB"),
            local("ScreenShot", "RGB"),
            optional("ColorMapPicker", "ColorMapPicker", "right", "Set Color Map [G]", "RGB"),
            local("PlotTable", "Table"),
            local("Catalogs", "Utils"),
            local("Crosshair", "Utils"),
            local("Drawing", "Utils"),
            local("FBrowser", "Utils"),
            optional("ChangeHistory", "History", "right", "History [G]", "Utils"),
            local("Mosaic", "Utils"),
            optional("FBrowser", "Open File", "right", "Open File [G]", "Utils"),
            local("Preferences", "Utils"),
            local("Ruler", "Utils"),
            optional("SaveImage", "SaveImage", "right", "Save File [G]", "Utils"),
            local("WCSAxes", "Utils"),
            optional("WBrowser", "Help", "channels", "Help [G]", "Help"),
            optional("Header", "Header", "left", "Header [G]", "Utils"),
            optional("Zoom", "Zoom", "left", "Zoom [G]", "Utils"),
        ];

        Self { descriptors }
    }

    /// A copy without the named global and local modules.
    pub fn without(&self, except_global: &[&str], except_local: &[&str]) -> Self {
        let descriptors = self
            .descriptors
            .iter()
            .filter(|desc| {
                let excluded = match desc.ptype {
                    PluginType::Global => except_global,
                    PluginType::Local => except_local,
                };
                !excluded.contains(&desc.module.as_str())
            })
            .cloned()
            .collect();
        Self { descriptors }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.descriptors.iter()
    }

    /// Distinct module names, in first-seen order.
    pub fn module_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for desc in &self.descriptors {
            if !names.contains(&desc.module.as_str()) {
                names.push(&desc.module);
            }
        }
        names
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_set_boot_plugins() {
        let defaults = DefaultPlugins::reference();
        let boot: Vec<&str> = defaults
            .iter()
            .filter(|d| d.starts_at_boot())
            .map(|d| d.module.as_str())
            .collect();
        assert_eq!(
            boot,
            vec![
                "Operations", "Toolbar", "Pan", "Info", "Thumbs", "Contents", "Colorbar",
                "Cursor", "Errors"
            ]
        );
        assert!(defaults.iter().filter(|d| d.starts_at_boot()).all(|d| d.hidden));
    }

    #[test]
    fn test_without_filters_by_type() {
        let defaults = DefaultPlugins::reference();
        let trimmed = defaults.without(&["Blink"], &["Cuts"]);

        // Global Blink gone, local Blink kept
        let blinks: Vec<PluginType> = trimmed
            .iter()
            .filter(|d| d.module == "Blink")
            .map(|d| d.ptype)
            .collect();
        assert_eq!(blinks, vec![PluginType::Local]);
        assert!(trimmed.iter().all(|d| d.module != "Cuts"));
        assert_eq!(trimmed.len(), defaults.len() - 2);
    }

    #[test]
    fn test_module_names_are_distinct() {
        let defaults = DefaultPlugins::reference();
        let names = defaults.module_names();
        assert_eq!(names.iter().filter(|n| **n == "FBrowser").count(), 1);
        assert!(names.contains(&"WCSAxes"));
    }
}
