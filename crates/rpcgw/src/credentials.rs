//! TLS credential loading.
//!
//! The certificate file carries the leaf certificate (and optionally its
//! chain). The raw PEM is kept so the gateway can dial the RPC engine it
//! shares a process with, trusting nothing but the server's own certificate.

use std::{fmt, io::BufReader, sync::Arc};

use common::ServeError;
use rustls::{
    pki_types::{CertificateDer, PrivateKeyDer},
    sign::CertifiedKey,
    ServerConfig,
};

/// ALPN identifiers offered by the listener, in preference order.
pub const ALPN_PROTOCOLS: [&[u8]; 2] = [b"h2", b"http/1.1"];

/// Key pair and trust roots for one server run. Immutable once loaded.
#[derive(Clone)]
pub struct CredentialSet {
    server_config: Arc<ServerConfig>,
    cert_pem: Arc<[u8]>,
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("cert_pem_len", &self.cert_pem.len())
            .finish_non_exhaustive()
    }
}

/// Make ring the process-wide rustls provider, for TLS clients that look it
/// up instead of taking one explicitly. Later calls are no-ops.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Read and validate the key pair at `cert_path` / `key_path`.
///
/// # Errors
///
/// - [`ServeError::Configuration`] if either path is empty.
/// - [`ServeError::CredentialLoad`] if a file cannot be read, holds no usable
///   PEM material, or the key does not belong to the leaf certificate.
pub fn load(cert_path: &str, key_path: &str) -> Result<CredentialSet, ServeError> {
    if cert_path.trim().is_empty() {
        return Err(ServeError::config("cert_file", "is required and must not be empty"));
    }
    if key_path.trim().is_empty() {
        return Err(ServeError::config("key_file", "is required and must not be empty"));
    }

    let cert_pem = std::fs::read(cert_path).map_err(|e| ServeError::credentials(cert_path, e))?;
    let key_pem = std::fs::read(key_path).map_err(|e| ServeError::credentials(key_path, e))?;

    from_pem(&cert_pem, &key_pem, cert_path, key_path)
}

/// Build a [`CredentialSet`] from PEM-encoded certificate and key bytes.
///
/// `cert_label` and `key_label` only appear in error messages.
pub fn from_pem(
    cert_pem: &[u8],
    key_pem: &[u8],
    cert_label: &str,
    key_label: &str,
) -> Result<CredentialSet, ServeError> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_pem))
        .collect::<Result<Vec<CertificateDer<'static>>, _>>()
        .map_err(|e| ServeError::credentials(cert_label, format!("invalid PEM: {e}")))?;
    if certs.is_empty() {
        return Err(ServeError::credentials(cert_label, "no certificate found in PEM data"));
    }

    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut BufReader::new(key_pem))
        .map_err(|e| ServeError::credentials(key_label, format!("invalid PEM: {e}")))?
        .ok_or_else(|| ServeError::credentials(key_label, "no private key found in PEM data"))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let signing_key = provider
        .key_provider
        .load_private_key(key.clone_key())
        .map_err(|e| ServeError::credentials(key_label, e))?;
    CertifiedKey::new(certs.clone(), signing_key)
        .keys_match()
        .map_err(|e| {
            ServeError::credentials(key_label, format!("key does not match {cert_label}: {e}"))
        })?;

    let mut server_config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ServeError::credentials(cert_label, e))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServeError::credentials(cert_label, e))?;
    server_config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();

    Ok(CredentialSet {
        server_config: Arc::new(server_config),
        cert_pem: Arc::from(cert_pem),
    })
}

impl CredentialSet {
    /// rustls configuration used to terminate inbound TLS.
    pub fn server_config(&self) -> Arc<ServerConfig> {
        Arc::clone(&self.server_config)
    }

    /// The raw certificate PEM, for clients that build their own trust store.
    pub fn cert_pem(&self) -> &[u8] {
        &self.cert_pem
    }
}
