//! Plugin error types

use std::fmt;

/// Plugin error type
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Initialization failed
    #[error("Initialization failed: {0}")]
    InitError(String),

    /// A parameter was rejected
    #[error("Invalid parameter '{name}': {message}")]
    ParameterError {
        /// Parameter name
        name: String,
        /// What is wrong with it
        message: String,
    },

    /// Runtime error
    #[error("Runtime error: {0}")]
    RuntimeError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Storage error
    #[error("Storage error: {0}")]
    StorageError(#[from] tandem_storage::Error),
}

/// Result type for plugin operations
pub type Result<T> = std::result::Result<T, PluginError>;

impl PluginError {
    /// Create a new initialization error
    pub fn init(msg: impl fmt::Display) -> Self {
        Self::InitError(msg.to_string())
    }

    /// Create a new parameter error
    pub fn parameter(name: impl fmt::Display, msg: impl fmt::Display) -> Self {
        Self::ParameterError {
            name: name.to_string(),
            message: msg.to_string(),
        }
    }

    /// Create a new runtime error
    pub fn runtime(msg: impl fmt::Display) -> Self {
        Self::RuntimeError(msg.to_string())
    }
}
