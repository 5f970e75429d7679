use secrecy::SecretString;
use serde::Deserialize;

/// Connection settings for the message broker.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Broker URL, e.g. `tls://nats.example.org:4222`.
    pub url: String,
    /// Durable consumer name; also used as the connection user.
    pub consumer: String,
    pub password: Option<SecretString>,
    /// Client certificate presented when the connection requires mutual TLS.
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
    /// JetStream stream the consumer is bound to.
    pub stream: String,
    /// Broad filter of the single subscription; per-purpose routing happens locally.
    pub subject_filter: String,
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    /// How long the broker waits for an acknowledgement before redelivering a message.
    ///
    /// Must outlast the longest delivery, see [`crate::shared::GatewayConfig::validate`].
    #[serde(default = "default_ack_wait_secs")]
    pub ack_wait_secs: u64,
}

fn default_connection_timeout_ms() -> u64 {
    10_000
}

fn default_ack_wait_secs() -> u64 {
    3_600
}
