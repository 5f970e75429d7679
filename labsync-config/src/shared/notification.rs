use serde::Deserialize;

/// Chat webhook receiving a message after each delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    pub webhook_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}
