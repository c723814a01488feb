//! Network plumbing shared by server instances.
//!
//! Module structure:
//! - `client` - Outbound HTTP client used by the proxy handler
//! - `tls` - Certificate loading and the skip-verify certificate verifier
//! - `network` - Listener creation and port availability checks

mod client;
mod network;
mod tls;

pub use client::{create_http_client, HttpClient};
pub use network::{create_listener, is_port_available};
pub use tls::{create_tls_acceptor, install_crypto_provider, AcceptAnyServerCert};
