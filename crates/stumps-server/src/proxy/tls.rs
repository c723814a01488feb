//! TLS plumbing for both legs of an instance.
//!
//! Incoming HTTPS uses a `tokio-rustls` acceptor loaded from PEM files.
//! Outgoing HTTPS may skip certificate checks for remotes with self-signed
//! certificates.

use anyhow::{bail, Context};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

/// Select the ring provider for the process. Safe to call repeatedly.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Server certificate verifier that trusts every remote.
///
/// Only used when `tls_skip_verify` is set.
#[derive(Debug)]
pub struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _signature: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _signature: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

fn load_certificates(path: &str) -> anyhow::Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).with_context(|| format!("Cannot open certificate '{path}'"))?;
    let certificates = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Cannot parse certificate '{path}'"))?;
    if certificates.is_empty() {
        bail!("No certificates found in '{path}'");
    }
    Ok(certificates)
}

/// First PKCS#8, PKCS#1 or SEC1 key in the file.
fn load_private_key(path: &str) -> anyhow::Result<PrivateKeyDer<'static>> {
    let file = File::open(path).with_context(|| format!("Cannot open private key '{path}'"))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .with_context(|| format!("Cannot parse private key '{path}'"))?
        .with_context(|| format!("No private key found in '{path}'"))
}

/// Build the acceptor used by instances with HTTPS enabled.
pub fn create_tls_acceptor(cert_path: &str, key_path: &str) -> anyhow::Result<TlsAcceptor> {
    install_crypto_provider();

    let certificates = load_certificates(cert_path)?;
    let key = load_private_key(key_path)?;
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certificates, key)
        .context("Certificate and private key do not form a valid TLS identity")?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_any_supports_common_schemes() {
        let schemes = AcceptAnyServerCert.supported_verify_schemes();
        assert!(schemes.contains(&SignatureScheme::RSA_PKCS1_SHA256));
        assert!(schemes.contains(&SignatureScheme::ECDSA_NISTP256_SHA256));
    }

    #[test]
    fn test_missing_certificate_file() {
        let err = create_tls_acceptor("/nonexistent/cert.pem", "/nonexistent/key.pem")
            .err()
            .unwrap();
        assert!(err.to_string().contains("/nonexistent/cert.pem"));
    }

    #[test]
    fn test_certificate_file_without_certificates() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        std::fs::write(&cert, "not a certificate").unwrap();
        let err = create_tls_acceptor(cert.to_str().unwrap(), "/nonexistent/key.pem")
            .err()
            .unwrap();
        assert!(err.to_string().contains("No certificates found"));
    }

    #[test]
    fn test_key_file_without_key() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("key.pem");
        std::fs::write(&key, "").unwrap();
        let err = load_private_key(key.to_str().unwrap()).err().unwrap();
        assert!(err.to_string().contains("No private key found"));
    }
}
