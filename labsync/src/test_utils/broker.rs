use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::RwLock;

use crate::bail;
use crate::broker::{Acknowledger, Broker, InboundMessage, MessageHandler};
use crate::error::{ErrorKind, GatewayResult};
use crate::test_utils::log::{EventLog, Recorded};

/// Acknowledger recording `Acked` with the sequence of its message.
#[derive(Debug, Clone)]
pub struct RecordingAcker {
    sequence: u64,
    log: EventLog,
}

#[async_trait::async_trait]
impl Acknowledger for RecordingAcker {
    async fn ack(&self) -> GatewayResult<()> {
        self.log
            .record(Recorded::Acked {
                sequence: self.sequence,
            })
            .await;
        Ok(())
    }
}

/// Builds an inbound message whose acknowledgements are recorded under `sequence`.
pub fn test_message(
    log: &EventLog,
    sequence: u64,
    subject: &str,
    payload: impl Into<Bytes>,
) -> InboundMessage {
    let acker = RecordingAcker {
        sequence,
        log: log.clone(),
    };
    InboundMessage::new(subject, payload, Box::new(acker))
}

#[derive(Default)]
struct Subscription {
    consumer: String,
    subject_filter: String,
    handler: Option<Arc<dyn MessageHandler + Send + Sync>>,
}

/// Broker delivering published messages straight to the subscribed handler.
///
/// [`MemoryBroker::publish`] awaits the handler, like a broker client delivering one message at a
/// time, and returns the sequence acknowledgements are recorded under.
#[derive(Clone)]
pub struct MemoryBroker {
    subscription: Arc<RwLock<Subscription>>,
    next_sequence: Arc<AtomicU64>,
    log: EventLog,
}

impl MemoryBroker {
    pub fn new(log: EventLog) -> Self {
        Self {
            subscription: Arc::default(),
            next_sequence: Arc::new(AtomicU64::new(1)),
            log,
        }
    }

    pub async fn publish(&self, subject: &str, payload: impl Into<Bytes>) -> GatewayResult<u64> {
        let handler = self.subscription.read().await.handler.clone();
        let Some(handler) = handler else {
            bail!(ErrorKind::BrokerSubscribeFailed, "No active subscription");
        };

        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        handler
            .handle(test_message(&self.log, sequence, subject, payload))
            .await;

        Ok(sequence)
    }

    /// Consumer name and filter of the current subscription.
    pub async fn subscription(&self) -> Option<(String, String)> {
        let subscription = self.subscription.read().await;
        subscription.handler.as_ref().map(|_| {
            (
                subscription.consumer.clone(),
                subscription.subject_filter.clone(),
            )
        })
    }
}

#[async_trait::async_trait]
impl Broker for MemoryBroker {
    async fn subscribe(
        &self,
        consumer: &str,
        subject_filter: &str,
        handler: Arc<dyn MessageHandler + Send + Sync>,
    ) -> GatewayResult<()> {
        let mut subscription = self.subscription.write().await;
        if subscription.handler.is_some() {
            bail!(
                ErrorKind::BrokerSubscribeFailed,
                "A subscription is already active",
                format!("consumer `{}`", subscription.consumer)
            );
        }

        *subscription = Subscription {
            consumer: consumer.to_string(),
            subject_filter: subject_filter.to_string(),
            handler: Some(handler),
        };
        Ok(())
    }

    async fn shutdown(&self) -> GatewayResult<()> {
        self.subscription.write().await.handler = None;
        self.log.record(Recorded::BrokerShutdown).await;
        Ok(())
    }
}
