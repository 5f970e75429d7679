//! Wiring of router, mailboxes, delivery tasks and dispatch loop.

use std::sync::Arc;

use labsync_config::shared::{BrokerConfig, GatewayConfig, SubjectsConfig};
use tracing::info;

use crate::broker::Broker;
use crate::concurrency::{Lane, Mailbox, mailbox};
use crate::delivery::{Deliverer, Executor, Planner};
use crate::dispatch::DispatchLoop;
use crate::error::GatewayResult;
use crate::router::{RouterLanes, SubscriptionRouter};
use crate::sinks::Sinks;
use crate::types::{ExternalSample, MessageFamily, TypedEnvelope};

/// The gateway before its subscription is started.
///
/// Delivery errors are logged on the `deliver` span by the [`Deliverer`], the lane handlers
/// discard them.
pub struct Gateway {
    broker_config: BrokerConfig,
    subjects: SubjectsConfig,
    deliverer: Deliverer,
    broker: Arc<dyn Broker + Send + Sync>,
}

impl Gateway {
    pub fn new(
        config: &GatewayConfig,
        broker: Arc<dyn Broker + Send + Sync>,
        sinks: Sinks,
    ) -> Self {
        let planner = Planner::new(
            &config.object_store.request_bucket,
            &config.object_store.external_sample_bucket,
        )
        .with_warehouse(sinks.warehouse.is_some())
        .with_pipeline(sinks.pipeline.is_some());

        Self {
            broker_config: config.broker.clone(),
            subjects: config.subjects.clone(),
            deliverer: Deliverer::new(planner, Executor::new(sinks)),
            broker,
        }
    }

    /// Creates the family mailboxes, subscribes the router and returns the loop to run.
    pub async fn start(self) -> GatewayResult<DispatchLoop> {
        let deliverer = self.deliverer;

        let (new_request_tx, new_request_rx) = mailbox(MessageFamily::NewRequest);
        let (updated_request_tx, updated_request_rx) = mailbox(MessageFamily::UpdatedRequest);
        let (updated_sample_tx, updated_sample_rx) = mailbox(MessageFamily::UpdatedSample);

        let mut lanes = vec![
            new_request_rx.into_lane(lane_handler(&deliverer, |d, envelope| async move {
                let _ = d.deliver_new_request(envelope).await;
            })),
            updated_request_rx.into_lane(lane_handler(&deliverer, |d, envelope| async move {
                let _ = d.deliver_updated_request(envelope).await;
            })),
            updated_sample_rx.into_lane(lane_handler(&deliverer, |d, envelope| async move {
                let _ = d.deliver_updated_sample(envelope).await;
            })),
        ];

        let mut router_lanes = RouterLanes {
            new_request: new_request_tx,
            updated_request: updated_request_tx,
            updated_sample: updated_sample_tx,
            released_external_samples: None,
            updated_external_samples: None,
        };

        if self.subjects.external_samples().is_some() {
            for family in [
                MessageFamily::ReleasedExternalSamples,
                MessageFamily::UpdatedExternalSamples,
            ] {
                let (tx, rx) = mailbox(family);
                lanes.push(external_lane(&deliverer, family, rx));
                match family {
                    MessageFamily::ReleasedExternalSamples => {
                        router_lanes.released_external_samples = Some(tx)
                    }
                    _ => router_lanes.updated_external_samples = Some(tx),
                }
            }
        }

        let router = Arc::new(SubscriptionRouter::new(&self.subjects, router_lanes));
        self.broker
            .subscribe(
                &self.broker_config.consumer,
                &self.broker_config.subject_filter,
                router,
            )
            .await?;
        info!(
            consumer = %self.broker_config.consumer,
            subject_filter = %self.broker_config.subject_filter,
            lanes = lanes.len(),
            "subscription started"
        );

        Ok(DispatchLoop::new(lanes, self.broker))
    }
}

fn lane_handler<T, F, Fut>(
    deliverer: &Deliverer,
    deliver: F,
) -> impl Fn(T) -> Fut + Send + 'static
where
    F: Fn(Deliverer, T) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let deliverer = deliverer.clone();
    move |envelope| deliver(deliverer.clone(), envelope)
}

fn external_lane(
    deliverer: &Deliverer,
    family: MessageFamily,
    mailbox: Mailbox<TypedEnvelope<ExternalSample>>,
) -> Lane {
    mailbox.into_lane(lane_handler(deliverer, move |d, envelope| async move {
        let _ = d.deliver_external_samples(family, envelope).await;
    }))
}
