use serde::Deserialize;

use crate::shared::ValidationError;

/// Object store buckets and the credential session settings of its client.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectStoreConfig {
    /// Bucket receiving request and sample documents.
    pub request_bucket: String,
    /// Bucket receiving externally sequenced sample documents.
    pub external_sample_bucket: String,
    pub session: SessionConfig,
}

/// Settings for the time-boxed object store client session.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Executable run with `sh` to refresh the shared credentials before a client is built.
    pub credential_refresh_command: String,
    /// Shared credentials profile the client is bound to.
    pub profile: String,
    pub region: String,
    /// Lifetime of a client, in seconds, after which it is rebuilt.
    pub max_duration_secs: f64,
    /// Pause between a successful credential refresh and client construction.
    #[serde(default = "default_settle_interval_ms")]
    pub settle_interval_ms: u64,
}

fn default_settle_interval_ms() -> u64 {
    60_000
}

impl ObjectStoreConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.request_bucket.trim().is_empty() {
            return Err(ValidationError::Empty("request_bucket"));
        }
        if self.external_sample_bucket.trim().is_empty() {
            return Err(ValidationError::Empty("external_sample_bucket"));
        }

        self.session.validate()
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.credential_refresh_command.trim().is_empty() {
            return Err(ValidationError::Empty("credential_refresh_command"));
        }
        if !(self.max_duration_secs.is_finite() && self.max_duration_secs > 0.0) {
            return Err(ValidationError::NonPositiveSessionDuration(
                self.max_duration_secs,
            ));
        }

        Ok(())
    }
}
