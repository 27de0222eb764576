//! Server credentials built from certificate material

use crate::dh::DhParams;
use crate::loader::{load_certificates, load_private_key};
use rustls::crypto::ring;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tandem_core::{Error, Result};
use tracing::debug;

/// Certificate chain and private key ready to serve TLS
#[derive(Debug, Clone)]
pub struct Credentials {
    certificate_file: PathBuf,
    certificates: Vec<CertificateDer<'static>>,
    key: Arc<PrivateKeyDer<'static>>,
    dh_params: Option<DhParams>,
    server_config: Arc<ServerConfig>,
}

impl Credentials {
    /// Load the certificate, optional intermediate chain and key
    ///
    /// The key must belong to the leaf certificate. The server configuration
    /// offers the provider's default key exchange groups until
    /// [`with_dh_params`](Self::with_dh_params) narrows them.
    pub fn load(certificate: &Path, key: &Path, chain: Option<&Path>) -> Result<Self> {
        let mut certificates = load_certificates(certificate)?;
        if let Some(chain) = chain {
            certificates.extend(load_certificates(chain)?);
        }
        let key = load_private_key(key)?;
        let server_config = server_config(&certificates, &key, None)?;

        debug!(
            certificate = %certificate.display(),
            chain_length = certificates.len(),
            "Credentials created"
        );

        Ok(Self {
            certificate_file: certificate.to_path_buf(),
            certificates,
            key: Arc::new(key),
            dh_params: None,
            server_config,
        })
    }

    /// Same certificate and key, offering only groups as strong as `params`
    pub fn with_dh_params(&self, params: DhParams) -> Result<Self> {
        let server_config = server_config(&self.certificates, &self.key, Some(params))?;
        debug!(
            certificate = %self.certificate_file.display(),
            group = %params,
            "Credentials bound to DH group"
        );

        Ok(Self {
            dh_params: Some(params),
            server_config,
            ..self.clone()
        })
    }

    /// Path of the leaf certificate
    pub fn certificate_file(&self) -> &Path {
        &self.certificate_file
    }

    /// Number of certificates presented to clients
    pub fn chain_length(&self) -> usize {
        self.certificates.len()
    }

    /// DH group the key exchange groups were chosen for
    pub fn dh_params(&self) -> Option<DhParams> {
        self.dh_params
    }

    /// rustls configuration for accepting TLS connections
    pub fn server_config(&self) -> Arc<ServerConfig> {
        Arc::clone(&self.server_config)
    }
}

fn server_config(
    certificates: &[CertificateDer<'static>],
    key: &PrivateKeyDer<'static>,
    dh_params: Option<DhParams>,
) -> Result<Arc<ServerConfig>> {
    let mut provider = ring::default_provider();
    if let Some(params) = dh_params {
        provider.kx_groups = params.key_exchange_groups();
    }

    let config = ServerConfig::builder_with_provider(Arc::new(provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::security(format!("Unsupported TLS protocol versions: {e}")))?
        .with_no_client_auth()
        .with_single_cert(certificates.to_vec(), key.clone_key())
        .map_err(|e| Error::security(format!("Invalid certificate or key: {e}")))?;
    Ok(Arc::new(config))
}

/// Key exchange groups `config` offers
pub fn offered_groups(config: &ServerConfig) -> Vec<rustls::NamedGroup> {
    config
        .crypto_provider()
        .kx_groups
        .iter()
        .map(|group| group.name())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    #[test]
    fn test_load_credentials() {
        let creds = Credentials::load(&fixture("server.crt"), &fixture("server.key"), None).unwrap();
        assert_eq!(creds.chain_length(), 1);
        assert_eq!(creds.certificate_file(), fixture("server.crt"));
    }

    #[test]
    fn test_load_with_chain() {
        let creds = Credentials::load(
            &fixture("server.crt"),
            &fixture("server.key"),
            Some(&fixture("server.crt")),
        )
        .unwrap();
        assert_eq!(creds.chain_length(), 2);
    }

    #[test]
    fn test_dh_params_narrow_key_exchange() {
        let creds = Credentials::load(&fixture("server.crt"), &fixture("server.key"), None).unwrap();
        assert!(creds.dh_params().is_none());
        assert_eq!(offered_groups(&creds.server_config()).len(), 3);

        let strong = creds.with_dh_params(DhParams::Ffdhe4096).unwrap();
        assert_eq!(strong.dh_params(), Some(DhParams::Ffdhe4096));
        assert_eq!(
            offered_groups(&strong.server_config()),
            vec![rustls::NamedGroup::secp384r1]
        );
        assert_eq!(strong.chain_length(), 1);
    }

    #[test]
    fn test_missing_key() {
        let result = Credentials::load(&fixture("server.crt"), Path::new("/nonexistent.key"), None);
        assert!(matches!(result, Err(Error::Security(_))));
    }
}
