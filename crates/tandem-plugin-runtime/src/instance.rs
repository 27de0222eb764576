//! Loaded plugin instances

use libloading::Library;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tandem_plugin_api::{Plugin, PluginDescriptor};
use tracing::debug;

static NEXT_PLUGIN_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a loaded plugin instance, unique within the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginId(u64);

impl PluginId {
    fn next() -> Self {
        PluginId(NEXT_PLUGIN_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plugin-{}", self.0)
    }
}

/// One initialized plugin
///
/// Dropping an instance runs `on_deinitialize` if that has not happened yet.
pub struct PluginInstance {
    id: PluginId,
    name: String,
    plugin: Box<dyn Plugin>,
    descriptor: PluginDescriptor,
    deinitialized: bool,
    // Dropped last: the plugin's code lives in the library
    _library: Option<Arc<Library>>,
}

impl PluginInstance {
    pub(crate) fn new(
        descriptor: PluginDescriptor,
        plugin: Box<dyn Plugin>,
        library: Option<Arc<Library>>,
    ) -> Self {
        Self {
            id: PluginId::next(),
            name: descriptor.name.to_string(),
            plugin,
            descriptor,
            deinitialized: false,
            _library: library,
        }
    }

    /// Instance identifier
    pub fn id(&self) -> PluginId {
        self.id
    }

    /// Plugin name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Descriptor the instance was created from
    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    /// Session type filter
    pub fn session_type(&self) -> Option<&'static str> {
        self.descriptor.session_type
    }

    pub(crate) fn plugin(&self) -> &dyn Plugin {
        self.plugin.as_ref()
    }

    pub(crate) fn plugin_mut(&mut self) -> &mut dyn Plugin {
        self.plugin.as_mut()
    }

    /// Run `on_deinitialize` once
    pub(crate) fn deinitialize(&mut self) {
        if !self.deinitialized {
            self.deinitialized = true;
            self.plugin.on_deinitialize();
            debug!(plugin = %self.name, id = %self.id, "Plugin deinitialized");
        }
    }
}

impl Drop for PluginInstance {
    fn drop(&mut self) {
        self.deinitialize();
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInstance")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("plugin", &self.plugin)
            .field("native", &self._library.is_some())
            .finish()
    }
}
