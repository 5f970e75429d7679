use tracing::{debug, info, warn};

use crate::bail;
use crate::broker::InboundMessage;
use crate::delivery::Effect;
use crate::error::{ErrorKind, GatewayResult};
use crate::sinks::{JSON_CONTENT_TYPE, Sinks, run_pipeline};

/// Applies delivery effects against the configured sinks.
#[derive(Debug, Clone)]
pub struct Executor {
    sinks: Sinks,
}

impl Executor {
    pub fn new(sinks: Sinks) -> Self {
        Self { sinks }
    }

    /// Applies `effects` in order and stops at the first failure.
    pub async fn execute(&self, effects: &[Effect]) -> GatewayResult<()> {
        for effect in effects {
            self.apply(effect).await?;
            debug!(%effect, "effect applied");
        }

        Ok(())
    }

    /// Acknowledges `message`, then posts `notification` when a notifier is configured.
    ///
    /// A notification failure is logged only: the message is already durably delivered.
    pub async fn commit(&self, message: &InboundMessage, notification: &str) {
        message.ack().await;
        info!(subject = %message.subject(), "message acknowledged");

        let Some(notifier) = &self.sinks.notifier else {
            return;
        };
        match notifier.notify(notification).await {
            Ok(()) => debug!(notifier = notifier.name(), "notification sent"),
            Err(err) => warn!(notifier = notifier.name(), error = %err, "failed to send notification"),
        }
    }

    async fn apply(&self, effect: &Effect) -> GatewayResult<()> {
        match effect {
            Effect::PutObject { bucket, key, body } => {
                self.sinks
                    .object_store
                    .put_object(bucket, key, JSON_CONTENT_TYPE, body.clone())
                    .await
            }
            Effect::UpsertRequest(row) => {
                let Some(warehouse) = &self.sinks.warehouse else {
                    bail!(ErrorKind::InvalidState, "No warehouse is configured");
                };
                let affected = warehouse.upsert_request(row).await?;
                check_row_count(effect, 1, affected)
            }
            Effect::UpsertSamples(rows) => {
                let Some(warehouse) = &self.sinks.warehouse else {
                    bail!(ErrorKind::InvalidState, "No warehouse is configured");
                };
                let affected = warehouse.upsert_samples(rows).await?;
                check_row_count(effect, rows.len() as u64, affected)
            }
            Effect::TriggerPipeline => {
                let Some((trigger, run)) = &self.sinks.pipeline else {
                    bail!(ErrorKind::InvalidState, "No pipeline is configured");
                };
                run_pipeline(trigger.as_ref(), run).await
            }
        }
    }
}

/// Fails unless exactly `expected` rows were written.
fn check_row_count(effect: &Effect, expected: u64, affected: u64) -> GatewayResult<()> {
    if affected != expected {
        bail!(
            ErrorKind::RowCountMismatch,
            "Unexpected number of rows written",
            format!("{effect}: expected {expected}, got {affected}")
        );
    }

    Ok(())
}
