//! Plugin load error types

use tandem_plugin_api::PluginError;

/// Why a plugin could not be loaded
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The module could not be found or opened
    #[error("Failed to open plugin module '{name}': {message}")]
    OpenFailed {
        /// Requested plugin name
        name: String,
        /// Cause reported by the module source
        message: String,
    },

    /// The module does not export the registration function
    #[error("Plugin module '{name}' has no entry point: {message}")]
    NoEntryPoint {
        /// Requested plugin name
        name: String,
        /// Cause reported by the dynamic loader
        message: String,
    },

    /// The module was built against another plugin interface
    #[error("Plugin '{name}' was built for plugin API {found}, server provides {expected}")]
    AbiMismatch {
        /// Requested plugin name
        name: String,
        /// Version in the descriptor
        found: u32,
        /// Version of this server
        expected: u32,
    },

    /// The module registers a different plugin name
    #[error("Plugin module '{requested}' registers itself as '{found}'")]
    NameMismatch {
        /// Requested plugin name
        requested: String,
        /// Name in the descriptor
        found: String,
    },

    /// Parameters do not match the plugin's schema
    #[error("Invalid parameters for plugin '{name}': {source}")]
    Parameter {
        /// Plugin name
        name: String,
        /// Parameter error
        #[source]
        source: PluginError,
    },

    /// `on_initialize` failed
    ///
    /// The plugin's error is kept as text. It may have been built by code in
    /// the plugin's module, which is unloaded before this error is seen.
    #[error("Plugin '{name}' failed to initialize: {message}")]
    Initialize {
        /// Plugin name
        name: String,
        /// Error returned by the plugin
        message: String,
    },
}

/// Result type for plugin loading
pub type Result<T> = std::result::Result<T, LoadError>;

impl LoadError {
    /// Create an open failure
    pub fn open_failed(name: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::OpenFailed {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// Create a missing entry point failure
    pub fn no_entry_point(name: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::NoEntryPoint {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// Name of the plugin that failed
    pub fn plugin_name(&self) -> &str {
        match self {
            LoadError::OpenFailed { name, .. }
            | LoadError::NoEntryPoint { name, .. }
            | LoadError::AbiMismatch { name, .. }
            | LoadError::Parameter { name, .. }
            | LoadError::Initialize { name, .. } => name,
            LoadError::NameMismatch { requested, .. } => requested,
        }
    }
}
