use std::sync::Arc;

use tracing::{Instrument, Span, error, field, info, info_span};

use crate::delivery::{DeliveryPlan, Executor, Planner};
use crate::error::{GatewayError, GatewayResult};
use crate::types::{
    ExternalSample, MessageFamily, Request, Sample, TypedEnvelope, external_sample_names,
};

/// Runs the delivery of one envelope per call, for every family.
///
/// Each call opens a `deliver` span below the envelope span and records its outcome in the
/// `status` field. A failed delivery leaves the message unacknowledged for the broker to
/// redeliver.
#[derive(Debug, Clone)]
pub struct Deliverer {
    planner: Arc<Planner>,
    executor: Arc<Executor>,
}

impl Deliverer {
    pub fn new(planner: Planner, executor: Executor) -> Self {
        Self {
            planner: Arc::new(planner),
            executor: Arc::new(executor),
        }
    }

    pub async fn deliver_new_request(
        &self,
        envelope: TypedEnvelope<Request>,
    ) -> GatewayResult<()> {
        let request = envelope.first();
        let span = deliver_span(&envelope, MessageFamily::NewRequest);
        span.record("request_id", request.request_id.as_str());
        span.record("sample_count", request.samples.len());

        let plan = self.planner.new_request(request);
        self.run(envelope, plan, span).await
    }

    pub async fn deliver_updated_request(
        &self,
        envelope: TypedEnvelope<Request>,
    ) -> GatewayResult<()> {
        let request = envelope.latest();
        let span = deliver_span(&envelope, MessageFamily::UpdatedRequest);
        span.record("request_id", request.request_id.as_str());

        let plan = self.planner.updated_request(request);
        self.run(envelope, plan, span).await
    }

    pub async fn deliver_updated_sample(
        &self,
        envelope: TypedEnvelope<Sample>,
    ) -> GatewayResult<()> {
        let sample = envelope.latest();
        let span = deliver_span(&envelope, MessageFamily::UpdatedSample);
        span.record("request_id", sample.request_id());
        span.record("sample_name", sample.primary_id.as_str());

        let plan = self.planner.updated_sample(sample);
        self.run(envelope, plan, span).await
    }

    pub async fn deliver_external_samples(
        &self,
        family: MessageFamily,
        envelope: TypedEnvelope<ExternalSample>,
    ) -> GatewayResult<()> {
        let span = deliver_span(&envelope, family);
        let names = external_sample_names(envelope.records());
        span.record("sample_name", names.as_str());
        span.record("sample_count", envelope.records().len());

        let plan = self.planner.external_samples(envelope.records());
        self.run(envelope, plan, span).await
    }

    async fn run<T>(
        &self,
        envelope: TypedEnvelope<T>,
        plan: GatewayResult<DeliveryPlan>,
        span: Span,
    ) -> GatewayResult<()> {
        let result = async {
            let plan = plan?;
            self.executor.execute(&plan.effects).await?;
            self.executor
                .commit(envelope.source(), &plan.notification)
                .await;

            Ok::<(), GatewayError>(())
        }
        .instrument(span.clone())
        .await;

        let _entered = span.enter();
        match &result {
            Ok(()) => {
                span.record("status", "ok");
                info!("delivery succeeded");
            }
            Err(err) => {
                span.record("status", "error");
                error!(error = %err, "delivery failed, message left unacknowledged");
            }
        }

        result
    }
}

fn deliver_span<T>(envelope: &TypedEnvelope<T>, family: MessageFamily) -> Span {
    info_span!(
        parent: envelope.span(),
        "deliver",
        %family,
        request_id = field::Empty,
        sample_name = field::Empty,
        sample_count = field::Empty,
        status = field::Empty,
    )
}
