//! Active configuration snapshot

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tandem_config::{Config, PluginParameterTable};
use tandem_core::{AuthContext, Result, SecurityPolicy};
use tandem_tls::{Credentials, DhParams};
use tracing::debug;

/// Everything the running server was configured with
///
/// A snapshot is built from a validated [`Config`] and never changes
/// afterwards; a successful reload replaces it as a whole.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    listen_address: Option<IpAddr>,
    port: u16,
    policy: SecurityPolicy,
    credentials: Option<Arc<Credentials>>,
    dh_group: String,
    dh_params: Option<Arc<DhParams>>,
    auth_context: Option<Arc<AuthContext>>,
    storage_root: PathBuf,
    plugins: Vec<String>,
    plugin_path: Option<PathBuf>,
    plugin_parameters: BTreeMap<String, PluginParameterTable>,
    config: Config,
}

impl ConfigSnapshot {
    /// Build a snapshot, loading certificate material if configured
    ///
    /// DH parameters are left unset; see [`ConfigSnapshot::with_dh_params`].
    pub fn from_config(config: Config) -> Result<Self> {
        let security = &config.security;

        let credentials = match (&security.certificate_file, &security.key_file) {
            (Some(cert), Some(key)) => Some(Arc::new(Credentials::load(
                cert,
                key,
                security.certificate_chain.as_deref(),
            )?)),
            _ => None,
        };

        let auth_context = security
            .password
            .as_ref()
            .map(|password| Arc::new(AuthContext::plain(password.clone())));

        debug!(
            port = config.server.port,
            policy = %security.policy,
            tls = credentials.is_some(),
            authentication = auth_context.is_some(),
            plugins = config.plugins.load.len(),
            "Configuration snapshot built"
        );

        Ok(Self {
            listen_address: config.server.listen_address,
            port: config.server.port,
            policy: security.policy,
            credentials,
            dh_group: security.dh_group.clone(),
            dh_params: None,
            auth_context,
            storage_root: config.storage.root_directory.clone(),
            plugins: config.plugins.load.clone(),
            plugin_path: config.plugins.path.clone(),
            plugin_parameters: config.plugins.parameters.clone(),
            config,
        })
    }

    /// Attach DH parameters, restricting TLS key exchange to match them
    pub fn with_dh_params(mut self, params: Arc<DhParams>) -> Result<Self> {
        if let Some(credentials) = &self.credentials {
            self.credentials = Some(Arc::new(credentials.with_dh_params(*params)?));
        }
        self.dh_params = Some(params);
        Ok(self)
    }

    /// Configured listen address, `None` for both wildcards
    pub fn listen_address(&self) -> Option<IpAddr> {
        self.listen_address
    }

    /// Configured port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Security policy
    pub fn security_policy(&self) -> SecurityPolicy {
        self.policy
    }

    /// TLS credentials
    pub fn credentials(&self) -> Option<&Arc<Credentials>> {
        self.credentials.as_ref()
    }

    /// Configured DH group name
    pub fn dh_group(&self) -> &str {
        &self.dh_group
    }

    /// DH parameters in use
    pub fn dh_params(&self) -> Option<&Arc<DhParams>> {
        self.dh_params.as_ref()
    }

    /// Authentication context
    pub fn auth_context(&self) -> Option<&Arc<AuthContext>> {
        self.auth_context.as_ref()
    }

    /// Storage root directory
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Requested plugins in load order
    pub fn plugins(&self) -> &[String] {
        &self.plugins
    }

    /// Plugin search path
    pub fn plugin_path(&self) -> Option<&Path> {
        self.plugin_path.as_deref()
    }

    /// Raw parameter tables per plugin
    pub fn plugin_parameters(&self) -> &BTreeMap<String, PluginParameterTable> {
        &self.plugin_parameters
    }

    /// The configuration the snapshot was built from
    pub fn config(&self) -> &Config {
        &self.config
    }
}
