//! Plugin context types

use std::path::Path;
use tandem_storage::FilesystemStorage;
use tracing::Dispatch;

/// Server facilities handed to a plugin at initialization
#[derive(Debug, Clone)]
pub struct PluginContext {
    plugin_name: String,
    storage: FilesystemStorage,
    dispatch: Dispatch,
}

impl PluginContext {
    /// Create a context for `plugin_name`
    ///
    /// Captures the caller's current tracing dispatcher.
    pub fn new(plugin_name: impl Into<String>, storage: FilesystemStorage) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            storage,
            dispatch: tracing::dispatcher::get_default(Dispatch::clone),
        }
    }

    /// Route this module's log events to the server's subscriber
    ///
    /// A native module carries its own copy of the `tracing` globals, so its
    /// events go nowhere until it adopts the server's dispatcher. Returns
    /// `false` if the module already had a global dispatcher, which is the
    /// case for modules compiled into the server.
    pub fn adopt_host_logging(&self) -> bool {
        tracing::dispatcher::set_global_default(self.dispatch.clone()).is_ok()
    }

    /// Name the plugin was loaded under
    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    /// Document storage of the server
    pub fn storage(&self) -> &FilesystemStorage {
        &self.storage
    }

    /// Root directory of the document storage
    pub fn storage_root(&self) -> &Path {
        self.storage.root_directory()
    }
}
