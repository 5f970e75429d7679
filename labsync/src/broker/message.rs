use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::GatewayResult;

/// Acknowledges a single broker message.
#[async_trait::async_trait]
pub trait Acknowledger {
    async fn ack(&self) -> GatewayResult<()>;
}

/// A message handed over by the broker client.
///
/// The message owns its acknowledgement capability. Ownership moves from the router to the
/// mailbox and then to the delivery task, which is the only place allowed to acknowledge.
pub struct InboundMessage {
    subject: String,
    payload: Bytes,
    acker: Box<dyn Acknowledger + Send + Sync>,
    acked: AtomicBool,
}

impl InboundMessage {
    pub fn new(
        subject: impl Into<String>,
        payload: impl Into<Bytes>,
        acker: Box<dyn Acknowledger + Send + Sync>,
    ) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
            acker,
            acked: AtomicBool::new(false),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn is_acked(&self) -> bool {
        self.acked.load(Ordering::Acquire)
    }

    /// Acknowledges the message once. Later calls are no-ops.
    ///
    /// A failure on a closed connection is logged and swallowed: the broker redelivers the
    /// message after its ack window.
    pub async fn ack(&self) {
        if self.acked.swap(true, Ordering::AcqRel) {
            debug!(subject = %self.subject, "message already acknowledged");
            return;
        }

        if let Err(err) = self.acker.ack().await {
            warn!(subject = %self.subject, error = %err, "failed to acknowledge message");
        }
    }
}

impl fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundMessage")
            .field("subject", &self.subject)
            .field("payload_len", &self.payload.len())
            .field("acked", &self.is_acked())
            .finish()
    }
}
