use serde::{Deserialize, Serialize};

/// PEM certificate chain and private key for instances accepting HTTPS.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
}
