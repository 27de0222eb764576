//! Configuration validation

use crate::Config;
use std::collections::HashSet;
use tandem_core::{Error, Result};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_storage(config)?;
    validate_security(config)?;
    validate_plugins(config)?;
    validate_observability(config)?;
    Ok(())
}

fn validate_storage(config: &Config) -> Result<()> {
    if config.storage.root_directory.as_os_str().is_empty() {
        return Err(Error::config("storage root-directory cannot be empty"));
    }
    Ok(())
}

fn validate_security(config: &Config) -> Result<()> {
    let security = &config.security;

    match (&security.certificate_file, &security.key_file) {
        (Some(_), None) => {
            return Err(Error::config(
                "security certificate-file is set but key-file is missing",
            ))
        }
        (None, Some(_)) => {
            return Err(Error::config(
                "security key-file is set but certificate-file is missing",
            ))
        }
        _ => {}
    }

    if security.certificate_chain.is_some() && security.certificate_file.is_none() {
        return Err(Error::config(
            "security certificate-chain requires certificate-file",
        ));
    }

    if security.policy.uses_tls() && !security.has_certificate() {
        return Err(Error::config(format!(
            "security policy {} requires certificate-file and key-file",
            security.policy
        )));
    }

    if !security.policy.uses_tls() && security.has_certificate() {
        tracing::warn!("Certificate configured but security policy is no-tls; it will not be used");
    }

    if security.dh_group.is_empty() {
        return Err(Error::config("security dh-group cannot be empty"));
    }

    if matches!(&security.password, Some(p) if p.is_empty()) {
        return Err(Error::config("security password cannot be empty"));
    }

    Ok(())
}

fn validate_plugins(config: &Config) -> Result<()> {
    let mut seen = HashSet::new();

    for name in &config.plugins.load {
        if !is_valid_plugin_name(name) {
            return Err(Error::config(format!(
                "Invalid plugin name: {name:?} (use lowercase letters, digits, '-' and '_')"
            )));
        }

        if !seen.insert(name.as_str()) {
            tracing::warn!(plugin = %name, "Plugin listed more than once");
        }
    }

    for name in config.plugins.parameters.keys() {
        if !seen.contains(name.as_str()) {
            tracing::warn!(plugin = %name, "Parameters given for a plugin that is not loaded");
        }
    }

    Ok(())
}

fn validate_observability(config: &Config) -> Result<()> {
    let logging = &config.observability.logging;

    match logging.format.as_str() {
        "text" | "json" => {}
        other => {
            return Err(Error::config(format!(
                "Invalid log format: {other} (must be text or json)"
            )))
        }
    }

    match logging.level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        other => Err(Error::config(format!("Invalid log level: {other}"))),
    }
}

/// Plugin names map onto module file names
fn is_valid_plugin_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tandem_core::SecurityPolicy;

    fn minimal_config() -> Config {
        let mut config = Config::default();
        config.security.policy = SecurityPolicy::NoTls;
        config
    }

    #[test]
    fn test_valid_minimal_config() {
        assert!(validate_config(&minimal_config()).is_ok());
    }

    #[test]
    fn test_require_tls_without_certificate() {
        let mut config = minimal_config();
        config.security.policy = SecurityPolicy::RequireTls;

        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("require-tls"));
    }

    #[test]
    fn test_tls_with_certificate() {
        let mut config = minimal_config();
        config.security.policy = SecurityPolicy::AllowTls;
        config.security.certificate_file = Some(PathBuf::from("cert.pem"));
        config.security.key_file = Some(PathBuf::from("key.pem"));

        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_certificate_without_key() {
        let mut config = minimal_config();
        config.security.certificate_file = Some(PathBuf::from("cert.pem"));

        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_plugin_name() {
        let mut config = minimal_config();
        config.plugins.load.push("../evil".to_string());

        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_duplicate_plugin_is_accepted() {
        let mut config = minimal_config();
        config.plugins.load = vec!["logging".to_string(), "logging".to_string()];

        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_log_format() {
        let mut config = minimal_config();
        config.observability.logging.format = "xml".to_string();

        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_empty_password() {
        let mut config = minimal_config();
        config.security.password = Some(String::new());

        assert!(validate_config(&config).is_err());
    }
}
