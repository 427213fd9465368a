// Adaptation Configuration
//
// JSON configuration for the whole adaptation core. Every field has a
// default so an empty object is a valid config.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policy::{FailedBatchPolicy, PolicyConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdaptationConfig {
    #[serde(default = "default_base_model")]
    pub base_model_id: String,

    #[serde(default = "default_device")]
    pub device: String,

    #[serde(default)]
    pub policy: PolicyConfig,

    /// Training runs longer than this are cancelled and count as failed.
    #[serde(default)]
    pub training_timeout_secs: Option<u64>,

    #[serde(default)]
    pub on_failure: FailedBatchPolicy,

    /// JSON Lines file mirroring every accepted correction.
    #[serde(default)]
    pub feedback_journal: Option<PathBuf>,

    /// Directory adapter storage references must exist under.
    /// Without it, references are treated as opaque.
    #[serde(default)]
    pub artifact_root: Option<PathBuf>,
}

fn default_base_model() -> String {
    "microsoft/phi-2".into()
}

fn default_device() -> String {
    "cpu".into()
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            base_model_id: default_base_model(),
            device: default_device(),
            policy: PolicyConfig::default_policy(),
            training_timeout_secs: None,
            on_failure: FailedBatchPolicy::default(),
            feedback_journal: None,
            artifact_root: None,
        }
    }
}

impl AdaptationConfig {
    pub fn from_json_str(data: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&data)
    }

    pub fn training_timeout(&self) -> Option<Duration> {
        self.training_timeout_secs.map(Duration::from_secs)
    }
}
