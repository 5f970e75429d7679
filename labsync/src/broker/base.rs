use std::sync::Arc;

use crate::broker::InboundMessage;
use crate::error::GatewayResult;

/// Receives every message matching the broker subscription.
///
/// The broker awaits `handle` before delivering the next message, so a handler that waits on a
/// full mailbox throttles delivery.
#[async_trait::async_trait]
pub trait MessageHandler {
    async fn handle(&self, message: InboundMessage);
}

/// A broker connection able to hold one durable subscription.
#[async_trait::async_trait]
pub trait Broker {
    /// Starts delivering messages matching `subject_filter` to `handler` under the durable
    /// consumer `consumer`.
    async fn subscribe(
        &self,
        consumer: &str,
        subject_filter: &str,
        handler: Arc<dyn MessageHandler + Send + Sync>,
    ) -> GatewayResult<()>;

    /// Stops delivery and closes the connection.
    async fn shutdown(&self) -> GatewayResult<()>;
}
