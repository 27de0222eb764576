//! Where a configuration is read from

use crate::{load_and_merge, ConfigFormat};
use crate::types::Config;
use std::path::PathBuf;
use tandem_core::Result;

/// Location of the configuration
///
/// A source is read again on every reload, so edits to the underlying files
/// take effect without restarting the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// A single file
    File(PathBuf),

    /// Several files merged in order, later files win
    Layered(Vec<PathBuf>),

    /// An in-memory document
    Inline {
        /// Document content
        content: String,
        /// Document format
        format: ConfigFormat,
    },
}

impl ConfigSource {
    /// Inline source
    pub fn inline(content: impl Into<String>, format: ConfigFormat) -> Self {
        ConfigSource::Inline {
            content: content.into(),
            format,
        }
    }

    /// Read, merge and validate the configuration
    pub fn load(&self) -> Result<Config> {
        match self {
            ConfigSource::File(path) => crate::loader::load_config(path),
            ConfigSource::Layered(paths) => load_and_merge(paths),
            ConfigSource::Inline { content, format } => {
                let config = crate::loader::load_from_str(content, *format)?;
                crate::validator::validate_config(&config)?;
                Ok(config)
            }
        }
    }

    /// Files backing this source
    pub fn paths(&self) -> Vec<PathBuf> {
        match self {
            ConfigSource::File(path) => vec![path.clone()],
            ConfigSource::Layered(paths) => paths.clone(),
            ConfigSource::Inline { .. } => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_inline_source() {
        let source = ConfigSource::inline("security:\n  policy: no-tls\n", ConfigFormat::Yaml);
        let config = source.load().unwrap();
        assert_eq!(config.server.port, 6523);
        assert!(source.paths().is_empty());
    }

    #[test]
    fn test_file_source_is_reread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tandem.yaml");
        let source = ConfigSource::File(path.clone());

        fs::write(&path, "security:\n  policy: no-tls\nserver:\n  port: 1000\n").unwrap();
        assert_eq!(source.load().unwrap().server.port, 1000);

        fs::write(&path, "security:\n  policy: no-tls\nserver:\n  port: 2000\n").unwrap();
        assert_eq!(source.load().unwrap().server.port, 2000);
    }

    #[test]
    fn test_invalid_source_fails_validation() {
        let source = ConfigSource::inline("{}", ConfigFormat::Json);
        assert!(source.load().is_err());
    }

    #[test]
    fn test_missing_file() {
        let source = ConfigSource::File(PathBuf::from("/nonexistent/tandem.yaml"));
        assert!(source.load().is_err());
    }
}
