//! Error types for storage operations

use std::path::PathBuf;

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for storage operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Root directory exists but is not a directory
    #[error("Storage root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Document name escapes the storage root
    #[error("Invalid document name: {0}")]
    InvalidName(String),

    /// Account storage used before being attached to a filesystem storage
    #[error("Account storage is not attached to a filesystem storage")]
    NotAttached,

    /// Account file could not be parsed
    #[error("Failed to parse account file {}: {message}", path.display())]
    AccountFile {
        /// Path of the account file
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Account already exists
    #[error("Account already exists: {0}")]
    AccountExists(String),

    /// I/O error
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path the operation was performed on
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
