//! HTTP client creation and configuration.
//!
//! The client never follows redirects, so 3xx responses from the remote
//! server reach the caller unchanged.

use super::tls::{install_crypto_provider, AcceptAnyServerCert};
use crate::config::ProxyClientConfig;
use http_body_util::combinators::BoxBody;
use hyper::body::Bytes;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Type alias for the HTTP client used by the proxy.
pub type HttpClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, BoxBody<Bytes, hyper::Error>>;

/// Create an HTTP/1.1 client with connection pooling.
///
/// Without native root certificates the client still serves plain HTTP
/// remotes; HTTPS remotes then fail verification.
pub fn create_http_client(config: &ProxyClientConfig) -> HttpClient {
    install_crypto_provider();

    let mut http_connector = HttpConnector::new();
    http_connector.set_connect_timeout(Some(Duration::from_secs(config.connect_timeout_secs)));
    http_connector.enforce_http(false); // Allow both HTTP and HTTPS

    let builder = if config.tls_skip_verify {
        warn!("TLS certificate verification DISABLED for remote servers (development/testing only)");
        hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(
            rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
                .with_no_client_auth(),
        )
    } else {
        match hyper_rustls::HttpsConnectorBuilder::new().with_native_roots() {
            Ok(builder) => builder,
            Err(e) => {
                warn!("Failed to load native root certificates: {}", e);
                hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(
                    rustls::ClientConfig::builder()
                        .with_root_certificates(rustls::RootCertStore::empty())
                        .with_no_client_auth(),
                )
            }
        }
    };
    let https_connector = builder
        .https_or_http()
        .enable_http1()
        .wrap_connector(http_connector);

    let http_client = Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .pool_max_idle_per_host(config.max_idle_per_host)
        .build(https_connector);

    debug!(
        "Proxy client configured (HTTP/1.1): max_idle={}, idle_timeout={}s, connect_timeout={}s",
        config.max_idle_per_host, config.idle_timeout_secs, config.connect_timeout_secs
    );

    http_client
}
