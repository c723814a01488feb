//! Configuration types for the Stumps server.

mod listen;
mod recording;
mod upstream;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use listen::TlsConfig;
pub use recording::RecordingConfig;
pub use upstream::ProxyClientConfig;

use crate::pipeline::FallbackResponse;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Root directory of the JSON storage for server instances and stumps.
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,

    /// Response returned by instances without a remote server.
    #[serde(default)]
    pub fallback_response: FallbackResponse,

    /// Outbound client settings used when proxying to remote servers.
    #[serde(default)]
    pub proxy: ProxyClientConfig,

    #[serde(default)]
    pub recording: RecordingConfig,

    /// Certificate and key for instances accepting HTTPS connections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            fallback_response: FallbackResponse::default(),
            proxy: ProxyClientConfig::default(),
            recording: RecordingConfig::default(),
            tls: None,
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./data")
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.storage_path.as_os_str().is_empty() {
            anyhow::bail!("'storage_path' must not be empty");
        }

        if self.proxy.request_timeout_secs == 0 {
            anyhow::bail!("'proxy.request_timeout_secs' must be greater than zero");
        }

        if self.recording.max_recordings == 0 {
            anyhow::bail!("'recording.max_recordings' must be greater than zero");
        }

        if let Some(ref tls) = self.tls {
            if tls.cert_path.trim().is_empty() || tls.key_path.trim().is_empty() {
                anyhow::bail!(
                    "TLS configuration requires both 'tls.cert_path' and 'tls.key_path'"
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let yaml = r#"
storage_path: /var/lib/stumps
fallback_response: http404-not-found
proxy:
  connect_timeout_secs: 2
  request_timeout_secs: 15
  tls_skip_verify: true
recording:
  max_recordings: 50
tls:
  cert_path: /etc/stumps/cert.pem
  key_path: /etc/stumps/key.pem
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.storage_path, PathBuf::from("/var/lib/stumps"));
        assert_eq!(config.fallback_response, FallbackResponse::Http404NotFound);
        assert_eq!(config.proxy.connect_timeout_secs, 2);
        assert_eq!(config.proxy.request_timeout_secs, 15);
        assert!(config.proxy.tls_skip_verify);
        assert_eq!(config.proxy.max_idle_per_host, 8);
        assert_eq!(config.recording.max_recordings, 50);
        assert_eq!(config.tls.unwrap().key_path, "/etc/stumps/key.pem");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.storage_path, PathBuf::from("./data"));
        assert_eq!(
            config.fallback_response,
            FallbackResponse::Http503ServiceUnavailable
        );
        assert_eq!(config.proxy.request_timeout_secs, 30);
        assert_eq!(config.recording.max_recordings, 1000);
        assert!(config.tls.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_fallback_kind_is_undefined() {
        let config: Config = serde_yaml::from_str("fallback_response: teapot").unwrap();
        assert_eq!(config.fallback_response, FallbackResponse::Undefined);
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = Config::default();
        config.recording.max_recordings = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.proxy.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_partial_tls() {
        let config = Config {
            tls: Some(TlsConfig {
                cert_path: "cert.pem".to_string(),
                key_path: " ".to_string(),
            }),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stumps.yaml");
        std::fs::write(&path, "recording:\n  max_recordings: 5\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.recording.max_recordings, 5);

        std::fs::write(&path, "recording:\n  max_recordings: 0\n").unwrap();
        assert!(Config::from_file(&path).is_err());
    }
}
