//! Configuration loading

use crate::{Config, ConfigFormat};
use regex::Regex;
use serde_json::Value;
use std::env;
use std::fs;
use std::path::Path;
use tandem_core::{Error, Result};
use tracing::debug;

/// Load configuration from a file
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
    let value = load_value(path.as_ref())?;
    from_value(value)
}

/// Load configuration from a string
pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<Config> {
    let value = parse_value(content, format)?;
    from_value(value)
}

/// Load a file and validate the result
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let config = load_from_file(path)?;
    crate::validator::validate_config(&config)?;
    Ok(config)
}

/// Load and merge multiple configuration files
///
/// Files are merged in order, with later files overriding earlier ones, so a
/// system-wide file can be refined by a per-user file. Keys absent from a
/// later file keep the value of the earlier one.
pub fn load_and_merge<P: AsRef<Path>>(paths: &[P]) -> Result<Config> {
    if paths.is_empty() {
        return Err(Error::config("No configuration files provided"));
    }

    let mut merged = Value::Object(serde_json::Map::new());
    for path in paths {
        let value = load_value(path.as_ref())?;
        merged = crate::merger::merge_values(merged, value);
    }

    let config = from_value(merged)?;
    crate::validator::validate_config(&config)?;
    Ok(config)
}

/// Read a file into an untyped configuration tree
pub(crate) fn load_value(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::config(format!(
            "Failed to read config file {}: {e}",
            path.display()
        ))
    })?;

    let format = ConfigFormat::from_path(path)?;
    debug!(path = %path.display(), ?format, "Loading configuration file");

    parse_value(&content, format)
}

/// Parse a string into an untyped configuration tree
pub(crate) fn parse_value(content: &str, format: ConfigFormat) -> Result<Value> {
    // Expand environment variables first
    let expanded = expand_env_vars(content)?;

    let value: Value = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(&expanded)
            .map_err(|e| Error::config(format!("Failed to parse YAML: {e}")))?,
        ConfigFormat::Toml => toml::from_str(&expanded)
            .map_err(|e| Error::config(format!("Failed to parse TOML: {e}")))?,
        ConfigFormat::Json => serde_json::from_str(&expanded)
            .map_err(|e| Error::config(format!("Failed to parse JSON: {e}")))?,
    };

    // An empty YAML document parses as null
    Ok(match value {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    })
}

fn from_value(value: Value) -> Result<Config> {
    serde_json::from_value(value).map_err(|e| Error::config(format!("Invalid configuration: {e}")))
}

/// Expand environment variables in configuration string
/// Supports syntax: ${VAR} and ${VAR:-default}
fn expand_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:-([^}]*))?\}")
        .map_err(|e| Error::config(format!("Invalid regex: {e}")))?;

    let mut result = String::with_capacity(content.len());
    let mut last_match = 0;

    for cap in re.captures_iter(content) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let var_name = var_name.as_str();
        let default_value = cap.get(3).map(|m| m.as_str());

        let value = match (env::var(var_name), default_value) {
            (Ok(val), _) => val,
            (Err(_), Some(default)) => default.to_string(),
            (Err(_), None) => {
                return Err(Error::config(format!(
                    "Environment variable '{var_name}' not set and no default provided"
                )));
            }
        };

        result.push_str(&content[last_match..full_match.start()]);
        result.push_str(&value);
        last_match = full_match.end();
    }

    result.push_str(&content[last_match..]);

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;
    use tandem_core::SecurityPolicy;

    const YAML_CONFIG: &str = r#"
server:
  listen-address: "0.0.0.0"
  port: 6524

storage:
  root-directory: "/srv/tandem"

security:
  policy: no-tls
  password: "secret"

plugins:
  load: ["logging", "autosave"]
  parameters:
    autosave:
      interval: 30
      hook: "/usr/local/bin/commit"

observability:
  logging:
    level: "debug"
    format: "json"
"#;

    #[test]
    fn test_load_yaml() {
        let config = load_from_str(YAML_CONFIG, ConfigFormat::Yaml).unwrap();

        assert_eq!(
            config.server.listen_address,
            Some("0.0.0.0".parse::<IpAddr>().unwrap())
        );
        assert_eq!(config.server.port, 6524);
        assert_eq!(config.security.policy, SecurityPolicy::NoTls);
        assert_eq!(config.plugins.load, vec!["logging", "autosave"]);
        assert_eq!(
            config.plugins.parameters_for("autosave").get("interval"),
            Some(&serde_json::json!(30))
        );
        assert_eq!(config.observability.logging.format, "json");
    }

    #[test]
    fn test_load_toml() {
        let toml_config = r#"
[server]
port = 7000

[security]
policy = "no-tls"

[plugins]
load = ["logging"]

[plugins.parameters.logging]
log-connections = true
"#;

        let config = load_from_str(toml_config, ConfigFormat::Toml).unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(
            config.plugins.parameters_for("logging").get("log-connections"),
            Some(&serde_json::json!(true))
        );
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = load_from_str("", ConfigFormat::Yaml).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_invalid_yaml() {
        let invalid = "server: [yaml";
        let result = load_from_str(invalid, ConfigFormat::Yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let result = load_from_str("security:\n  policy: maybe-tls\n", ConfigFormat::Yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_env_var_substitution() {
        env::set_var("TANDEM_TEST_PORT", "9090");

        let config = load_from_str("server:\n  port: ${TANDEM_TEST_PORT}\n", ConfigFormat::Yaml)
            .unwrap();
        assert_eq!(config.server.port, 9090);

        env::remove_var("TANDEM_TEST_PORT");
    }

    #[test]
    fn test_env_var_with_default() {
        env::remove_var("TANDEM_UNDEFINED_ROOT");

        let config = load_from_str(
            "storage:\n  root-directory: \"${TANDEM_UNDEFINED_ROOT:-/var/lib/tandem}\"\n",
            ConfigFormat::Yaml,
        )
        .unwrap();
        assert_eq!(
            config.storage.root_directory,
            std::path::PathBuf::from("/var/lib/tandem")
        );
    }

    #[test]
    fn test_missing_env_var_no_default() {
        env::remove_var("TANDEM_MISSING_VAR");

        let result = load_from_str("server:\n  port: ${TANDEM_MISSING_VAR}\n", ConfigFormat::Yaml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("TANDEM_MISSING_VAR"));
    }

    #[test]
    fn test_multiple_env_vars() {
        env::set_var("TANDEM_A", "alpha");
        env::set_var("TANDEM_B", "beta");

        let expanded = expand_env_vars("${TANDEM_A}/${TANDEM_B}/${TANDEM_C:-gamma}").unwrap();
        assert_eq!(expanded, "alpha/beta/gamma");

        env::remove_var("TANDEM_A");
        env::remove_var("TANDEM_B");
    }

    #[test]
    fn test_load_and_merge_layers() {
        let dir = tempfile::tempdir().unwrap();
        let system = dir.path().join("system.yaml");
        let user = dir.path().join("user.toml");

        fs::write(
            &system,
            "server:\n  port: 6523\nsecurity:\n  policy: no-tls\nplugins:\n  load: [logging]\n",
        )
        .unwrap();
        fs::write(&user, "[server]\nport = 7000\n").unwrap();

        let config = load_and_merge(&[&system, &user]).unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.security.policy, SecurityPolicy::NoTls);
        assert_eq!(config.plugins.load, vec!["logging"]);
    }

    #[test]
    fn test_load_and_merge_requires_files() {
        let paths: [&Path; 0] = [];
        assert!(load_and_merge(&paths).is_err());
    }
}
