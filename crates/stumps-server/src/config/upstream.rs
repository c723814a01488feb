use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outbound HTTP client settings for the proxy handler.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyClientConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Upper bound for one remote call, response body included.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Accept any certificate from HTTPS remote servers.
    #[serde(default)]
    pub tls_skip_verify: bool,

    #[serde(default = "default_pool_max_idle_per_host")]
    pub max_idle_per_host: usize,

    #[serde(default = "default_pool_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl Default for ProxyClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            tls_skip_verify: false,
            max_idle_per_host: default_pool_max_idle_per_host(),
            idle_timeout_secs: default_pool_idle_timeout(),
        }
    }
}

impl ProxyClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

fn default_pool_max_idle_per_host() -> usize {
    8
}

fn default_pool_idle_timeout() -> u64 {
    90
}
