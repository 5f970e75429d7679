use std::collections::HashSet;
use std::fmt;

use bytes::Bytes;

use crate::bail;
use crate::error::{ErrorKind, GatewayResult};
use crate::sinks::{
    RequestRow, SampleRow, clinical_key, encode_document, request_key, sample_key,
};
use crate::types::{ExternalSample, Request, Sample, external_sample_names};

/// One side effect of a delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    PutObject {
        bucket: String,
        key: String,
        body: Bytes,
    },
    UpsertRequest(RequestRow),
    UpsertSamples(Vec<SampleRow>),
    TriggerPipeline,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::PutObject { bucket, key, .. } => write!(f, "put {bucket}/{key}"),
            Effect::UpsertRequest(row) => write!(f, "upsert request {}", row.request_id),
            Effect::UpsertSamples(rows) => write!(f, "upsert {} sample rows", rows.len()),
            Effect::TriggerPipeline => f.write_str("trigger pipeline"),
        }
    }
}

/// Ordered effects of a delivery and the text posted once they all succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryPlan {
    pub effects: Vec<Effect>,
    pub notification: String,
}

/// Builds delivery plans for every message family.
#[derive(Debug, Clone)]
pub struct Planner {
    request_bucket: String,
    external_sample_bucket: String,
    warehouse: bool,
    pipeline: bool,
}

impl Planner {
    pub fn new(
        request_bucket: impl Into<String>,
        external_sample_bucket: impl Into<String>,
    ) -> Self {
        Self {
            request_bucket: request_bucket.into(),
            external_sample_bucket: external_sample_bucket.into(),
            warehouse: false,
            pipeline: false,
        }
    }

    /// Adds warehouse upserts to request and sample plans.
    pub fn with_warehouse(mut self, enabled: bool) -> Self {
        self.warehouse = enabled;
        self
    }

    /// Ends every plan with a pipeline run.
    pub fn with_pipeline(mut self, enabled: bool) -> Self {
        self.pipeline = enabled;
        self
    }

    /// Persists each nested sample on its own, then the request without its samples.
    ///
    /// Nested sample rows are keyed by the parent request, so sample names must be unique within
    /// it.
    pub fn new_request(&self, request: &Request) -> GatewayResult<DeliveryPlan> {
        let mut parent = request.clone();
        let samples = parent.strip_samples();

        let mut names = HashSet::with_capacity(samples.len());
        if let Some(duplicate) = samples
            .iter()
            .find(|sample| !names.insert(sample.sample_name.as_str()))
        {
            bail!(
                ErrorKind::DecodeFailed,
                "Request lists a sample name twice",
                format!(
                    "request `{}`, sample name `{}`",
                    parent.request_id, duplicate.sample_name
                )
            );
        }

        let mut effects = Vec::with_capacity(samples.len() + 4);
        for sample in &samples {
            effects.push(self.put(&self.request_bucket, sample_key(&sample.primary_id), sample)?);
        }
        effects.push(self.put(&self.request_bucket, request_key(&parent.request_id), &parent)?);

        if self.warehouse {
            effects.push(Effect::UpsertRequest(RequestRow::from_request(&parent)?));
            if !samples.is_empty() {
                let rows = samples
                    .iter()
                    .map(|sample| SampleRow::for_request(&parent.request_id, sample))
                    .collect::<GatewayResult<Vec<_>>>()?;
                effects.push(Effect::UpsertSamples(rows));
            }
        }

        Ok(self.finish(
            effects,
            format!(
                "New request written to object store:\n\tRequest Id: {}",
                parent.request_id
            ),
        ))
    }

    /// Persists the most recent version of a request as received.
    pub fn updated_request(&self, request: &Request) -> GatewayResult<DeliveryPlan> {
        let mut effects = vec![self.put(
            &self.request_bucket,
            request_key(&request.request_id),
            request,
        )?];

        if self.warehouse {
            let mut parent = request.clone();
            parent.strip_samples();
            effects.push(Effect::UpsertRequest(RequestRow::from_request(&parent)?));
        }

        Ok(self.finish(
            effects,
            format!(
                "Updated request written to object store:\n\tRequest Id: {}",
                request.request_id
            ),
        ))
    }

    pub fn updated_sample(&self, sample: &Sample) -> GatewayResult<DeliveryPlan> {
        let mut effects = vec![self.put(
            &self.request_bucket,
            sample_key(&sample.primary_id),
            sample,
        )?];

        if self.warehouse {
            effects.push(Effect::UpsertSamples(vec![SampleRow::from_sample(sample)?]));
        }

        Ok(self.finish(
            effects,
            format!(
                "Updated sample written to object store:\n\tSample Name: {}",
                sample.primary_id
            ),
        ))
    }

    /// Persists every sample of the batch individually. External samples are not warehoused.
    pub fn external_samples(&self, samples: &[ExternalSample]) -> GatewayResult<DeliveryPlan> {
        let effects = samples
            .iter()
            .map(|sample| {
                self.put(
                    &self.external_sample_bucket,
                    clinical_key(&sample.primary_id),
                    sample,
                )
            })
            .collect::<GatewayResult<Vec<_>>>()?;

        Ok(self.finish(
            effects,
            format!(
                "External samples written to object store:\n\tSample Names: {}",
                external_sample_names(samples)
            ),
        ))
    }

    fn put<T: serde::Serialize>(
        &self,
        bucket: &str,
        key: String,
        record: &T,
    ) -> GatewayResult<Effect> {
        Ok(Effect::PutObject {
            bucket: bucket.to_string(),
            key,
            body: encode_document(record)?,
        })
    }

    fn finish(&self, mut effects: Vec<Effect>, notification: String) -> DeliveryPlan {
        if self.pipeline {
            effects.push(Effect::TriggerPipeline);
        }

        DeliveryPlan {
            effects,
            notification,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn request() -> Request {
        serde_json::from_value(json!({
            "igoRequestId": "R1",
            "samples": [
                { "primaryId": "R1_1", "sampleName": "A", "additionalProperties": { "igoRequestId": "R1" } },
                { "primaryId": "R1_2", "sampleName": "B", "additionalProperties": { "igoRequestId": "R1" } }
            ]
        }))
        .unwrap()
    }

    fn keys(plan: &DeliveryPlan) -> Vec<String> {
        plan.effects.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn new_request_writes_samples_before_parent() {
        let plan = Planner::new("requests", "clinical")
            .new_request(&request())
            .unwrap();

        assert_eq!(
            keys(&plan),
            vec![
                "put requests/R1_1_sample.json",
                "put requests/R1_2_sample.json",
                "put requests/R1_request.json",
            ]
        );

        let Effect::PutObject { body, .. } = &plan.effects[2] else {
            panic!("expected a put");
        };
        let parent: Request = serde_json::from_slice(body).unwrap();
        assert!(parent.samples.is_empty());
        assert_eq!(
            plan.notification,
            "New request written to object store:\n\tRequest Id: R1"
        );
    }

    #[test]
    fn warehouse_and_pipeline_follow_object_writes() {
        let plan = Planner::new("requests", "clinical")
            .with_warehouse(true)
            .with_pipeline(true)
            .new_request(&request())
            .unwrap();

        assert_eq!(
            keys(&plan)[3..],
            [
                "upsert request R1".to_string(),
                "upsert 2 sample rows".to_string(),
                "trigger pipeline".to_string(),
            ]
        );
        let Effect::UpsertRequest(row) = &plan.effects[3] else {
            panic!("expected a request upsert");
        };
        assert_eq!(row.document["samples"], json!([]));
    }

    #[test]
    fn nested_sample_rows_are_keyed_by_the_parent_request() {
        let request: Request = serde_json::from_value(json!({
            "igoRequestId": "R1",
            "samples": [
                { "primaryId": "R1_1", "sampleName": "A" },
                { "primaryId": "R1_2", "sampleName": "B" }
            ]
        }))
        .unwrap();

        let plan = Planner::new("requests", "clinical")
            .with_warehouse(true)
            .new_request(&request)
            .unwrap();

        let Some(Effect::UpsertSamples(rows)) = plan.effects.last() else {
            panic!("expected a sample upsert");
        };
        let keys: Vec<_> = rows
            .iter()
            .map(|row| (row.request_id.as_str(), row.sample_name.as_str()))
            .collect();
        assert_eq!(keys, vec![("R1", "A"), ("R1", "B")]);
    }

    #[test]
    fn duplicate_sample_names_are_rejected() {
        let request: Request = serde_json::from_value(json!({
            "igoRequestId": "R1",
            "samples": [
                { "primaryId": "R1_1", "sampleName": "A" },
                { "primaryId": "R1_2", "sampleName": "A" }
            ]
        }))
        .unwrap();

        let err = Planner::new("requests", "clinical")
            .new_request(&request)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DecodeFailed);
        assert!(err.detail().unwrap().contains("sample name `A`"));
    }

    #[test]
    fn standalone_sample_without_request_id_is_rejected() {
        let sample: Sample = serde_json::from_value(json!({
            "primaryId": "R1_1",
            "sampleName": "A"
        }))
        .unwrap();

        let err = Planner::new("requests", "clinical")
            .with_warehouse(true)
            .updated_sample(&sample)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DecodeFailed);
    }

    #[test]
    fn external_samples_go_to_their_own_bucket() {
        let samples = vec![
            ExternalSample {
                primary_id: "P-1".to_string(),
                cmo_sample_name: "C-1".to_string(),
                ..Default::default()
            },
            ExternalSample {
                primary_id: "P-2".to_string(),
                cmo_sample_name: "C-2".to_string(),
                ..Default::default()
            },
        ];

        let plan = Planner::new("requests", "clinical")
            .with_warehouse(true)
            .external_samples(&samples)
            .unwrap();

        assert_eq!(
            keys(&plan),
            vec!["put clinical/P-1_clinical.json", "put clinical/P-2_clinical.json"]
        );
        assert!(plan.notification.ends_with("Sample Names: C-1, C-2"));
    }
}
