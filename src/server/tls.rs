use crate::server::tls::Error::{MissingCertificate, MissingPrivateKey, ReadError};
use rustls::{
    pki_types::{CertificateDer, PrivateKeyDer},
    ServerConfig,
};
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot read {0}: {1}")]
    ReadError(PathBuf, std::io::Error),
    #[error("no certificate found in {0}")]
    MissingCertificate(PathBuf),
    #[error("no private key found in {0}")]
    MissingPrivateKey(PathBuf),
    #[error("invalid TLS configuration: {0}")]
    RustlsError(#[from] rustls::Error),
}

/// Builds the rustls configuration used to terminate TLS on accepted connections from a PEM
/// certificate chain and a PEM private key.
pub fn load_server_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>, Error> {
    let certs = read_certificates(cert_path)?;
    let key = read_private_key(key_path)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    config.alpn_protocols = vec![b"http/1.1".to_vec(), b"http/1.0".to_vec()];

    tracing::debug!(
        "Loaded TLS certificate {} and key {}",
        cert_path.display(),
        key_path.display()
    );

    Ok(Arc::new(config))
}

fn open(path: &Path) -> Result<BufReader<File>, Error> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|err| ReadError(path.to_path_buf(), err))
}

fn read_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, Error> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| ReadError(path.to_path_buf(), err))?;

    if certs.is_empty() {
        return Err(MissingCertificate(path.to_path_buf()));
    }

    Ok(certs)
}

fn read_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, Error> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|err| ReadError(path.to_path_buf(), err))?
        .ok_or_else(|| MissingPrivateKey(path.to_path_buf()))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("rest-assured-{}-{}", std::process::id(), name));
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn missing_files_are_reported() {
        let missing = Path::new("/definitely/not/here.pem");

        let result = load_server_config(missing, missing);

        assert!(matches!(result, Err(ReadError(path, _)) if path == missing));
    }

    #[test]
    fn files_without_pem_blocks_are_rejected() {
        let empty = temp_file("empty.pem", "not a certificate\n");

        assert!(matches!(
            read_certificates(&empty),
            Err(MissingCertificate(_))
        ));
        assert!(matches!(
            read_private_key(&empty),
            Err(MissingPrivateKey(_))
        ));

        let _ = std::fs::remove_file(empty);
    }
}
