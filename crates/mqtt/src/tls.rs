//! Mutual-TLS material for the broker connection.
//!
//! Certificates and the private key are read and PEM-parsed up front so
//! that a bad file fails startup with a clear [`TlsError`] instead of an
//! opaque handshake failure later.

use std::path::{Path, PathBuf};

use rumqttc::Transport;

/// Where the CA bundle, client certificate and client key live on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsMaterialPaths {
    pub ca_file: PathBuf,
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

/// Validated PEM material, ready to hand to the transport.
pub struct TlsMaterial {
    ca: Vec<u8>,
    cert: Vec<u8>,
    key: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse PEM in {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("No certificates found in {0}")]
    NoCertificates(PathBuf),

    #[error("No private key found in {0}")]
    NoPrivateKey(PathBuf),
}

/// Read and validate all three files.
pub fn load_tls_material(paths: &TlsMaterialPaths) -> Result<TlsMaterial, TlsError> {
    let ca = read(&paths.ca_file)?;
    check_certificates(&paths.ca_file, &ca)?;

    let cert = read(&paths.cert_file)?;
    check_certificates(&paths.cert_file, &cert)?;

    let key = read(&paths.key_file)?;
    check_private_key(&paths.key_file, &key)?;

    tracing::info!(
        ca = %paths.ca_file.display(),
        cert = %paths.cert_file.display(),
        "Loaded MQTT TLS material"
    );

    Ok(TlsMaterial { ca, cert, key })
}

impl TlsMaterial {
    pub fn into_transport(self) -> Transport {
        Transport::tls(self.ca, Some((self.cert, self.key)), None)
    }
}

fn read(path: &Path) -> Result<Vec<u8>, TlsError> {
    std::fs::read(path).map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn check_certificates(path: &Path, pem: &[u8]) -> Result<(), TlsError> {
    let mut reader = pem;
    let mut count = 0;
    for cert in rustls_pemfile::certs(&mut reader) {
        cert.map_err(|e| TlsError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        count += 1;
    }

    if count == 0 {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(())
}

fn check_private_key(path: &Path, pem: &[u8]) -> Result<(), TlsError> {
    let mut reader = pem;
    match rustls_pemfile::private_key(&mut reader) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(TlsError::NoPrivateKey(path.to_path_buf())),
        Err(e) => Err(TlsError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}
