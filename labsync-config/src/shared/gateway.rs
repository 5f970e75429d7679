use serde::Deserialize;

use crate::Config;
use crate::shared::{
    BrokerConfig, NotificationConfig, ObjectStoreConfig, PipelineConfig, SubjectsConfig,
    ValidationError, WarehouseConfig,
};

/// Top level configuration of the gateway service.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub broker: BrokerConfig,
    pub subjects: SubjectsConfig,
    pub object_store: ObjectStoreConfig,
    /// Warehouse writes are skipped when absent.
    pub warehouse: Option<WarehouseConfig>,
    /// No pipeline is triggered when absent.
    pub pipeline: Option<PipelineConfig>,
    /// No notification is posted when absent.
    pub notification: Option<NotificationConfig>,
}

impl Config for GatewayConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

impl GatewayConfig {
    /// Validates the configuration before any client is built.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.broker.consumer.trim().is_empty() {
            return Err(ValidationError::Empty("broker.consumer"));
        }
        if self.broker.subject_filter.trim().is_empty() {
            return Err(ValidationError::Empty("broker.subject_filter"));
        }

        self.subjects.validate()?;
        self.object_store.validate()?;

        if let Some(warehouse) = &self.warehouse {
            warehouse.validate()?;
        }
        if let Some(pipeline) = &self.pipeline {
            pipeline.validate()?;
        }
        if let Some(notification) = &self.notification
            && notification.webhook_url.trim().is_empty()
        {
            return Err(ValidationError::Empty("notification.webhook_url"));
        }

        let required_ms = self.longest_delivery_wait_ms();
        if self.broker.ack_wait_secs.saturating_mul(1_000) <= required_ms {
            return Err(ValidationError::AckWaitTooShort { required_ms });
        }

        Ok(())
    }

    /// Sum of the deliberate waits a single delivery can go through: the session settle
    /// interval and, when a pipeline is configured, both of its state waits.
    pub fn longest_delivery_wait_ms(&self) -> u64 {
        let pipeline_ms = self.pipeline.as_ref().map_or(0, |pipeline| {
            pipeline
                .idle_timeout_secs
                .saturating_add(pipeline.running_timeout_secs)
                .saturating_mul(1_000)
        });

        self.object_store
            .session
            .settle_interval_ms
            .saturating_add(pipeline_ms)
    }
}
