use secrecy::SecretString;
use serde::Deserialize;

use crate::shared::ValidationError;

/// Downstream pipeline started after every successful delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Workspace host, with or without an `https://` scheme.
    pub host: String,
    pub token: SecretString,
    pub pipeline_name: String,
    #[serde(default = "default_wait_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_wait_timeout_secs")]
    pub running_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_wait_timeout_secs() -> u64 {
    15 * 60
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.trim().is_empty() {
            return Err(ValidationError::Empty("pipeline.host"));
        }
        if self.pipeline_name.trim().is_empty() {
            return Err(ValidationError::Empty("pipeline.pipeline_name"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ValidationError::Zero("pipeline.poll_interval_ms"));
        }

        Ok(())
    }
}
