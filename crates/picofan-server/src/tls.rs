//! Optional TLS, enabled when a certificate and key are stored in flash.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor;
use tracing::info;

use crate::error::ServerError;

pub const CERT_FILE: &str = "cert.der";
pub const KEY_FILE: &str = "key.der";

/// Build an acceptor from `cert.der` and `key.der` in `root`.
///
/// Returns `None` unless both files exist, in which case the server runs in
/// plain text.
pub fn load_acceptor(root: &Path) -> Result<Option<TlsAcceptor>, ServerError> {
    let cert_path = root.join(CERT_FILE);
    let key_path = root.join(KEY_FILE);
    if !cert_path.is_file() || !key_path.is_file() {
        return Ok(None);
    }

    let cert = CertificateDer::from(fs::read(&cert_path)?);
    let key_bytes = fs::read(&key_path)?;
    let key = PrivateKeyDer::try_from(key_bytes.as_slice())
        .map_err(|e| ServerError::Tls(format!("{}: {}", KEY_FILE, e)))?
        .clone_key();

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ServerError::Tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(vec![cert], key)
        .map_err(|e| ServerError::Tls(e.to_string()))?;

    info!("Loaded TLS certificate from {}", cert_path.display());
    Ok(Some(TlsAcceptor::from(Arc::new(config))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plaintext_without_both_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_acceptor(dir.path()).unwrap().is_none());

        fs::write(dir.path().join(CERT_FILE), b"cert").unwrap();
        assert!(load_acceptor(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_acceptor_from_stored_certificate() {
        let dir = tempfile::tempdir().unwrap();
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let cert = rcgen::CertificateParams::new(vec!["picofan.local".to_string()])
            .unwrap()
            .self_signed(&key_pair)
            .unwrap();
        fs::write(dir.path().join(CERT_FILE), cert.der()).unwrap();
        fs::write(dir.path().join(KEY_FILE), key_pair.serialize_der()).unwrap();

        assert!(load_acceptor(dir.path()).unwrap().is_some());
    }

    #[test]
    fn test_unreadable_key_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CERT_FILE), b"cert").unwrap();
        fs::write(dir.path().join(KEY_FILE), b"not a key").unwrap();

        assert!(matches!(
            load_acceptor(dir.path()),
            Err(ServerError::Tls(_))
        ));
    }
}
