// TLS setup — PEM loading and rustls config construction
//
// Certificate generation is an operational concern (openssl/rcgen at deploy
// time); this module only loads existing material. Failures here are startup
// errors: the gateway and server refuse to run without valid TLS material.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::{ClientConfig, RootCertStore, ServerConfig};

#[derive(Debug, Error)]
pub enum TlsSetupError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no certificate found in {0}")]
    NoCertificate(PathBuf),
    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),
    #[error("rejected TLS material: {0}")]
    Rustls(#[from] tokio_rustls::rustls::Error),
}

/// Load every certificate from a PEM file.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsSetupError> {
    let file = File::open(path).map_err(|source| TlsSetupError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsSetupError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsSetupError::NoCertificate(path.to_path_buf()));
    }
    Ok(certs)
}

/// Load the first private key from a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsSetupError> {
    let file = File::open(path).map_err(|source| TlsSetupError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|source| TlsSetupError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsSetupError::NoPrivateKey(path.to_path_buf()))
}

/// Build the ingestion listener's server-side TLS config.
pub fn server_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>, TlsSetupError> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;
    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(Arc::new(config))
}

/// Build the relay client's TLS config.
///
/// Trusts the webpki roots, plus an optional extra root certificate for
/// deployments running on a self-signed ingestion endpoint.
pub fn client_config(extra_root: Option<&Path>) -> Result<Arc<ClientConfig>, TlsSetupError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if let Some(path) = extra_root {
        for cert in load_certs(path)? {
            roots.add(cert)?;
        }
    }

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_self_signed(dir: &Path) -> (PathBuf, PathBuf) {
        let signed = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_path = dir.join("server.crt");
        let key_path = dir.join("server.key");
        std::fs::write(&cert_path, signed.cert.pem()).unwrap();
        std::fs::write(&key_path, signed.key_pair.serialize_pem()).unwrap();
        (cert_path, key_path)
    }

    #[test]
    fn test_server_config_from_generated_material() {
        let dir = tempdir().unwrap();
        let (cert_path, key_path) = write_self_signed(dir.path());

        assert!(server_config(&cert_path, &key_path).is_ok());
    }

    #[test]
    fn test_client_config_accepts_extra_root() {
        let dir = tempdir().unwrap();
        let (cert_path, _) = write_self_signed(dir.path());

        assert!(client_config(Some(&cert_path)).is_ok());
        assert!(client_config(None).is_ok());
    }

    #[test]
    fn test_missing_material_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.pem");
        assert!(matches!(
            server_config(&missing, &missing),
            Err(TlsSetupError::Read { .. })
        ));
    }

    #[test]
    fn test_empty_pem_is_rejected() {
        let dir = tempdir().unwrap();
        let empty = dir.path().join("empty.pem");
        std::fs::write(&empty, "").unwrap();
        assert!(matches!(
            load_certs(&empty),
            Err(TlsSetupError::NoCertificate(_))
        ));
        assert!(matches!(
            load_private_key(&empty),
            Err(TlsSetupError::NoPrivateKey(_))
        ));
    }
}
