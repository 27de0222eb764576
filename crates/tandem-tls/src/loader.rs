//! Certificate and key loading utilities

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls_pemfile::{certs, private_key};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tandem_core::{Error, Result};
use tracing::info;

/// Load certificates from a PEM file
pub fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| {
        Error::security(format!(
            "Failed to open certificate file {}: {e}",
            path.display()
        ))
    })?;

    let mut reader = BufReader::new(file);
    let certs = certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::security(format!("Failed to parse certificates: {e}")))?;

    if certs.is_empty() {
        return Err(Error::security(format!(
            "No certificates found in {}",
            path.display()
        )));
    }

    info!(
        path = %path.display(),
        count = certs.len(),
        "Loaded TLS certificates"
    );

    Ok(certs)
}

/// Load private key from a PEM file
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|e| {
        Error::security(format!(
            "Failed to open private key file {}: {e}",
            path.display()
        ))
    })?;

    let mut reader = BufReader::new(file);
    let key = private_key(&mut reader)
        .map_err(|e| Error::security(format!("Failed to parse private key: {e}")))?
        .ok_or_else(|| Error::security(format!("No private key found in {}", path.display())))?;

    info!(path = %path.display(), "Loaded TLS private key");

    Ok(key)
}
