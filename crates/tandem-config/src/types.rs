//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use tandem_core::SecurityPolicy;

/// Raw parameter table of one plugin
pub type PluginParameterTable = serde_json::Map<String, serde_json::Value>;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Network configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Document storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Transport security and authentication
    #[serde(default)]
    pub security: SecurityConfig,

    /// Plugins
    #[serde(default)]
    pub plugins: PluginsConfig,

    /// Observability
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    /// Address to listen on; both wildcard addresses when unset
    #[serde(default)]
    pub listen_address: Option<IpAddr>,

    /// TCP port (0 picks an ephemeral port)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Reload automatically when a configuration file changes
    #[serde(default)]
    pub watch_config: bool,

    /// Quiet period before a file change triggers a reload
    #[serde(default = "default_watch_debounce", with = "humantime_serde")]
    pub watch_debounce: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: None,
            port: default_port(),
            watch_config: false,
            watch_debounce: default_watch_debounce(),
        }
    }
}

/// Document storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Root directory of the filesystem storage
    #[serde(default = "default_root_directory")]
    pub root_directory: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_directory: default_root_directory(),
        }
    }
}

/// Transport security and authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct SecurityConfig {
    /// Security policy of the listeners
    #[serde(default)]
    pub policy: SecurityPolicy,

    /// Server certificate (PEM)
    #[serde(default)]
    pub certificate_file: Option<PathBuf>,

    /// Private key of the certificate (PEM)
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    /// Additional intermediate certificates (PEM)
    #[serde(default)]
    pub certificate_chain: Option<PathBuf>,

    /// Named Diffie-Hellman group
    #[serde(default = "default_dh_group")]
    pub dh_group: String,

    /// Password clients must present; no authentication when unset
    #[serde(default)]
    pub password: Option<String>,
}

impl SecurityConfig {
    /// Whether certificate material is configured
    pub fn has_certificate(&self) -> bool {
        self.certificate_file.is_some() && self.key_file.is_some()
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            policy: SecurityPolicy::default(),
            certificate_file: None,
            key_file: None,
            certificate_chain: None,
            dh_group: default_dh_group(),
            password: None,
        }
    }
}

/// Plugin configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct PluginsConfig {
    /// Plugins to load, in load order
    #[serde(default)]
    pub load: Vec<String>,

    /// Directory searched for native plugin modules
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Parameter table per plugin name
    #[serde(default)]
    pub parameters: BTreeMap<String, PluginParameterTable>,
}

impl PluginsConfig {
    /// Parameter table of a plugin (empty when not configured)
    pub fn parameters_for(&self, name: &str) -> PluginParameterTable {
        self.parameters.get(name).cloned().unwrap_or_default()
    }
}

/// Observability configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ObservabilityConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, text)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_port() -> u16 {
    6523
}

fn default_watch_debounce() -> Duration {
    Duration::from_millis(500)
}

fn default_root_directory() -> PathBuf {
    PathBuf::from("documents")
}

fn default_dh_group() -> String {
    "ffdhe2048".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 6523);
        assert!(config.server.listen_address.is_none());
        assert_eq!(config.security.policy, SecurityPolicy::RequireTls);
        assert_eq!(config.security.dh_group, "ffdhe2048");
        assert_eq!(config.observability.logging.level, "info");
        assert!(config.plugins.load.is_empty());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parameters_for_missing_plugin() {
        let plugins = PluginsConfig::default();
        assert!(plugins.parameters_for("logging").is_empty());
    }
}
