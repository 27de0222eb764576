//! Error types for the Tandem server

/// Result type alias using [`Error`]
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main error type for the Tandem server
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Security material (certificates, keys, DH parameters) error
    #[error("Security error: {0}")]
    Security(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] tandem_storage::Error),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Runtime error
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (should not happen in production)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    /// Create a security error
    pub fn security(message: impl Into<String>) -> Self {
        Error::Security(message.into())
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Error::Network(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("port must be > 0");
        assert_eq!(err.to_string(), "Configuration error: port must be > 0");
    }

    #[test]
    fn test_storage_conversion() {
        let err: Error = tandem_storage::Error::NotAttached.into();
        assert!(matches!(err, Error::Storage(_)));
    }
}
