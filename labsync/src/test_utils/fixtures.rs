use std::collections::BTreeMap;

use bytes::Bytes;
use labsync_config::shared::{
    BrokerConfig, GatewayConfig, ObjectStoreConfig, SessionConfig, SubjectsConfig,
};
use prost::Message;
use serde::Serialize;
use serde_json::{Map, json};

use crate::types::{ExternalSample, ExternalSampleBatch, Request, Sample, SampleProperties};

pub const NEW_REQUEST_SUBJECT: &str = "LABSYNC.request.new";
pub const UPDATED_REQUEST_SUBJECT: &str = "LABSYNC.request.update";
pub const UPDATED_SAMPLE_SUBJECT: &str = "LABSYNC.sample.update";
pub const RELEASED_EXTERNAL_SUBJECT: &str = "LABSYNC.external.release";
pub const UPDATED_EXTERNAL_SUBJECT: &str = "LABSYNC.external.update";

pub const REQUEST_BUCKET: &str = "requests";
pub const EXTERNAL_SAMPLE_BUCKET: &str = "clinical";

pub fn sample(request_id: &str, primary_id: &str) -> Sample {
    Sample {
        primary_id: primary_id.to_string(),
        sample_name: format!("{primary_id}-name"),
        additional_properties: SampleProperties {
            request_id: request_id.to_string(),
            fields: Map::new(),
        },
        fields: Map::from_iter([("tumorOrNormal".to_string(), json!("Tumor"))]),
    }
}

pub fn request(request_id: &str, sample_ids: &[&str]) -> Request {
    Request {
        request_id: request_id.to_string(),
        samples: sample_ids
            .iter()
            .map(|primary_id| sample(request_id, primary_id))
            .collect(),
        fields: Map::from_iter([("projectManagerName".to_string(), json!("Doe, Jane"))]),
    }
}

pub fn external_sample(primary_id: &str, name: &str) -> ExternalSample {
    ExternalSample {
        primary_id: primary_id.to_string(),
        cmo_sample_name: name.to_string(),
        attributes: BTreeMap::from([("oncotreeCode".to_string(), "LUAD".to_string())]),
    }
}

/// Encodes `value` as JSON wrapped in a quoted string literal, the wire format of JSON families.
pub fn quoted_json<T: Serialize>(value: &T) -> Bytes {
    let document = serde_json::to_string(value).unwrap();
    Bytes::from(serde_json::to_string(&document).unwrap())
}

pub fn external_batch(samples: Vec<ExternalSample>) -> Bytes {
    Bytes::from(ExternalSampleBatch { samples }.encode_to_vec())
}

pub fn subjects_config(with_external: bool) -> SubjectsConfig {
    SubjectsConfig {
        new_request: NEW_REQUEST_SUBJECT.to_string(),
        updated_request: UPDATED_REQUEST_SUBJECT.to_string(),
        updated_sample: UPDATED_SAMPLE_SUBJECT.to_string(),
        released_external_samples: with_external.then(|| RELEASED_EXTERNAL_SUBJECT.to_string()),
        updated_external_samples: with_external.then(|| UPDATED_EXTERNAL_SUBJECT.to_string()),
    }
}

pub fn gateway_config(with_external: bool) -> GatewayConfig {
    GatewayConfig {
        broker: BrokerConfig {
            url: "nats://localhost:4222".to_string(),
            consumer: "labsync".to_string(),
            password: None,
            tls_cert_path: None,
            tls_key_path: None,
            stream: "LABSYNC".to_string(),
            subject_filter: "LABSYNC.>".to_string(),
            connection_timeout_ms: 1_000,
            ack_wait_secs: 3_600,
        },
        subjects: subjects_config(with_external),
        object_store: ObjectStoreConfig {
            request_bucket: REQUEST_BUCKET.to_string(),
            external_sample_bucket: EXTERNAL_SAMPLE_BUCKET.to_string(),
            session: SessionConfig {
                credential_refresh_command: "/bin/true".to_string(),
                profile: "default".to_string(),
                region: "us-east-1".to_string(),
                max_duration_secs: 3600.0,
                settle_interval_ms: 0,
            },
        },
        warehouse: None,
        pipeline: None,
        notification: None,
    }
}
