// Bundled Plugins - constructors for the plugins shipped with the viewer
//
// Image-processing behavior lives outside this crate. The bundled entries are
// view shells: they attach to their workspace, follow the active channel and
// release their view on stop.

use crate::channel::Channel;
use crate::types::Result;

use super::api::{Plugin, PluginContext, constructor};
use super::defaults::DefaultPlugins;
use super::descriptor::PluginDescriptor;
use super::loader::FactoryTable;

/// Generic view plugin used for every bundled name
#[derive(Debug)]
pub struct ViewPlugin {
    name: String,
    context: Option<PluginContext>,
    channel: Option<String>,
}

impl ViewPlugin {
    pub fn new(desc: &PluginDescriptor) -> Self {
        Self {
            name: desc.name().to_string(),
            context: None,
            channel: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Channel this view last followed
    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }
}

impl Plugin for ViewPlugin {
    fn start(&mut self, ctx: PluginContext) -> Result<()> {
        tracing::debug!("{} attached to '{}'", self.name, ctx.workspace);
        self.channel = ctx.channel.clone();
        self.context = Some(ctx);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.context.take().is_some() {
            tracing::debug!("{} released its view", self.name);
        }
        Ok(())
    }

    fn channel_changed(&mut self, channel: &Channel) {
        // Local instances stay bound to their own channel
        let bound = self.context.as_ref().and_then(|ctx| ctx.channel.as_ref());
        if bound.is_none() {
            self.channel = Some(channel.name.clone());
        }
    }
}

/// Factory table holding a constructor for every module in `defaults`.
pub fn bundled_factories(defaults: &DefaultPlugins) -> FactoryTable {
    let mut table = FactoryTable::new("bundled plugins");
    for module in defaults.module_names() {
        table.insert(
            module,
            constructor(|desc| Ok(Box::new(ViewPlugin::new(desc)) as Box<dyn Plugin>)),
        );
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_factories_cover_defaults() {
        let defaults = DefaultPlugins::reference();
        let table = bundled_factories(&defaults);
        for desc in defaults.iter() {
            assert!(table.contains(&desc.lookup_key()), "missing {}", desc.module);
        }
        assert_eq!(table.len(), defaults.module_names().len());
    }

    #[test]
    fn test_view_plugin_follows_channel_until_bound() {
        let mut view = ViewPlugin::new(&PluginDescriptor::global("Pan", "uleft"));
        let mut channel = Channel::new("Image", "channels", 10);
        channel.active = true;

        view.channel_changed(&channel);
        assert_eq!(view.channel(), Some("Image"));
        assert_eq!(view.name(), "Pan");
    }
}
