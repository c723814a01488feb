use crate::recording::DEFAULT_MAX_RECORDINGS;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordingConfig {
    /// Recordings kept per instance before the oldest are evicted.
    #[serde(default = "default_max_recordings")]
    pub max_recordings: usize,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            max_recordings: default_max_recordings(),
        }
    }
}

fn default_max_recordings() -> usize {
    DEFAULT_MAX_RECORDINGS
}
