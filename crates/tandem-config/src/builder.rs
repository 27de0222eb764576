//! Configuration builder

use crate::types::Config;
use std::net::IpAddr;
use std::path::PathBuf;
use tandem_core::{Result, SecurityPolicy};

/// Builder for constructing configuration programmatically
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set listen address
    pub fn listen_address(mut self, addr: IpAddr) -> Self {
        self.config.server.listen_address = Some(addr);
        self
    }

    /// Set port
    pub fn port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    /// Set storage root directory
    pub fn root_directory(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.storage.root_directory = root.into();
        self
    }

    /// Set security policy
    pub fn security_policy(mut self, policy: SecurityPolicy) -> Self {
        self.config.security.policy = policy;
        self
    }

    /// Set certificate and key files
    pub fn certificate(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.config.security.certificate_file = Some(cert.into());
        self.config.security.key_file = Some(key.into());
        self
    }

    /// Require clients to authenticate with a password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.security.password = Some(password.into());
        self
    }

    /// Set the native plugin search path
    pub fn plugin_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.plugins.path = Some(path.into());
        self
    }

    /// Append a plugin to the load list
    pub fn plugin(mut self, name: impl Into<String>) -> Self {
        self.config.plugins.load.push(name.into());
        self
    }

    /// Set one parameter of a plugin
    pub fn plugin_parameter(
        mut self,
        plugin: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.config
            .plugins
            .parameters
            .entry(plugin.into())
            .or_default()
            .insert(key.into(), value.into());
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        crate::validator::validate_config(&self.config)?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .port(7000)
            .security_policy(SecurityPolicy::NoTls)
            .plugin("autosave")
            .plugin_parameter("autosave", "interval", 30)
            .build()
            .unwrap();

        assert_eq!(config.server.port, 7000);
        assert_eq!(config.plugins.load, vec!["autosave"]);
        assert_eq!(
            config.plugins.parameters_for("autosave")["interval"],
            serde_json::json!(30)
        );
    }

    #[test]
    fn test_builder_validates() {
        // require-tls is the default and needs a certificate
        let result = ConfigBuilder::new().build();
        assert!(result.is_err());
    }
}
