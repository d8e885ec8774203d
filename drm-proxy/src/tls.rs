//! TLS setup for the greeting listener
//!
//! Uses static PEM files when both paths are configured, otherwise a
//! self-signed certificate for the configured domains.

use rustls::ServerConfig;
use rustls_pemfile::{certs, pkcs8_private_keys, rsa_private_keys};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;
use tracing::info;

use crate::config::TlsConfig;
use crate::error::{ProxyError, Result};

/// TLS manager for handling certificates
pub struct TlsManager {
    config: TlsConfig,
}

impl TlsManager {
    pub fn new(config: TlsConfig) -> Self {
        Self { config }
    }

    /// Build a TLS acceptor from configuration
    pub fn build_acceptor(&self) -> Result<TlsAcceptor> {
        let server_config = self.build_server_config()?;
        Ok(TlsAcceptor::from(Arc::new(server_config)))
    }

    fn build_server_config(&self) -> Result<ServerConfig> {
        match (&self.config.cert_path, &self.config.key_path) {
            (Some(cert_path), Some(key_path)) => {
                info!("Loading TLS certificate from {} and {}", cert_path, key_path);
                self.load_static_certs(Path::new(cert_path), Path::new(key_path))
            }
            (None, None) => {
                info!("No TLS certificate configured, generating self-signed certificate");
                self.generate_self_signed()
            }
            _ => Err(ProxyError::Tls(
                "cert_path and key_path must be set together".to_string(),
            )),
        }
    }

    fn load_static_certs(&self, cert_path: &Path, key_path: &Path) -> Result<ServerConfig> {
        let cert_file = File::open(cert_path)
            .map_err(|e| ProxyError::Tls(format!("Failed to open certificate file: {}", e)))?;
        let certs_der = certs(&mut BufReader::new(cert_file))
            .map_err(|e| ProxyError::Tls(format!("Failed to read certificates: {}", e)))?;

        if certs_der.is_empty() {
            return Err(ProxyError::Tls("No certificates found in file".to_string()));
        }

        let key = load_private_key(key_path)?;
        let certs = certs_der.into_iter().map(rustls::Certificate).collect();

        server_config(certs, key)
    }

    fn generate_self_signed(&self) -> Result<ServerConfig> {
        let subject_alt_names = if self.config.domains.is_empty() {
            vec!["localhost".to_string()]
        } else {
            self.config.domains.clone()
        };

        let cert = rcgen::generate_simple_self_signed(subject_alt_names)
            .map_err(|e| ProxyError::Tls(format!("Failed to generate self-signed cert: {}", e)))?;

        let certs = vec![rustls::Certificate(cert.cert.der().to_vec())];
        let key = rustls::PrivateKey(cert.key_pair.serialize_der());

        server_config(certs, key)
    }
}

// PKCS#8 first, then PKCS#1 RSA.
fn load_private_key(key_path: &Path) -> Result<rustls::PrivateKey> {
    let open = || {
        File::open(key_path)
            .map(BufReader::new)
            .map_err(|e| ProxyError::Tls(format!("Failed to open key file: {}", e)))
    };

    let mut keys = pkcs8_private_keys(&mut open()?)
        .map_err(|e| ProxyError::Tls(format!("Failed to read PKCS8 keys: {}", e)))?;
    if keys.is_empty() {
        keys = rsa_private_keys(&mut open()?)
            .map_err(|e| ProxyError::Tls(format!("Failed to read RSA keys: {}", e)))?;
    }

    keys.into_iter()
        .next()
        .map(rustls::PrivateKey)
        .ok_or_else(|| ProxyError::Tls("No private key found in file".to_string()))
}

fn server_config(certs: Vec<rustls::Certificate>, key: rustls::PrivateKey) -> Result<ServerConfig> {
    ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ProxyError::Tls(format!("TLS config error: {}", e)))
}
