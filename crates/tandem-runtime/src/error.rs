//! Reload error types

use tandem_plugin_runtime::LoadError;

/// Why a reload (or startup) was refused
///
/// A reload that returns any of these left the running server untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReloadError {
    /// A plugin module could not be found or opened
    #[error("Failed to open plugin module: {0}")]
    OpenFailed(String),

    /// A plugin module lacks a usable registration function
    #[error("Plugin module has no usable entry point: {0}")]
    NoEntryPoint(String),

    /// A plugin refused to start
    #[error("Plugin failed to initialize: {0}")]
    PluginInitFailed(String),

    /// The listen address differs from the running one
    #[error("Changing the listen address requires a restart (running on {current}, configured {requested})")]
    ListenAddressChangeUnsupported {
        /// Address in use
        current: String,
        /// Address in the new configuration
        requested: String,
    },

    /// No listener could be bound
    #[error("Failed to bind listener: {0}")]
    ListenerBindFailed(String),

    /// No listener could be opened
    #[error("Failed to open listener: {0}")]
    ListenerOpenFailed(String),

    /// The storage could not be attached
    #[error("Failed to attach storage: {0}")]
    StorageAttachFailed(String),

    /// The configuration could not be read or is invalid
    #[error("Failed to load configuration: {0}")]
    ConfigParseFailed(String),

    /// Certificates, keys or DH parameters are unusable
    #[error("Invalid security material: {0}")]
    SecurityMaterial(String),

    /// The server state violates an invariant
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for reloads
pub type Result<T> = std::result::Result<T, ReloadError>;

impl ReloadError {
    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        ReloadError::Internal(message.into())
    }

    /// Short stable name of the error kind, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ReloadError::OpenFailed(_) => "open-failed",
            ReloadError::NoEntryPoint(_) => "no-entry-point",
            ReloadError::PluginInitFailed(_) => "plugin-init-failed",
            ReloadError::ListenAddressChangeUnsupported { .. } => "listen-address-change-unsupported",
            ReloadError::ListenerBindFailed(_) => "listener-bind-failed",
            ReloadError::ListenerOpenFailed(_) => "listener-open-failed",
            ReloadError::StorageAttachFailed(_) => "storage-attach-failed",
            ReloadError::ConfigParseFailed(_) => "config-parse-failed",
            ReloadError::SecurityMaterial(_) => "security-material",
            ReloadError::Internal(_) => "internal",
        }
    }
}

impl From<LoadError> for ReloadError {
    fn from(err: LoadError) -> Self {
        let message = err.to_string();
        match err {
            LoadError::OpenFailed { .. } => ReloadError::OpenFailed(message),
            LoadError::NoEntryPoint { .. }
            | LoadError::AbiMismatch { .. }
            | LoadError::NameMismatch { .. } => ReloadError::NoEntryPoint(message),
            LoadError::Parameter { .. } => ReloadError::ConfigParseFailed(message),
            LoadError::Initialize { .. } => ReloadError::PluginInitFailed(message),
        }
    }
}
