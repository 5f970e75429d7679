use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ErrorKind, GatewayResult};
use crate::gateway_error;
use crate::types::{ExternalSample, Request, Sample};

/// Content type of every document written by the gateway.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Key/value storage holding one JSON document per domain record.
///
/// Writes overwrite existing objects, so replaying a delivery is safe.
#[async_trait::async_trait]
pub trait ObjectStore {
    fn name(&self) -> &'static str;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        body: Bytes,
    ) -> GatewayResult<()>;

    async fn get_object(&self, bucket: &str, key: &str) -> GatewayResult<Bytes>;

    async fn delete_object(&self, bucket: &str, key: &str) -> GatewayResult<()>;
}

pub fn request_key(request_id: &str) -> String {
    format!("{request_id}_request.json")
}

pub fn sample_key(primary_id: &str) -> String {
    format!("{primary_id}_sample.json")
}

pub fn clinical_key(primary_id: &str) -> String {
    format!("{primary_id}_clinical.json")
}

/// Serializes `record` as the JSON body of an object.
pub fn encode_document<T: Serialize>(record: &T) -> GatewayResult<Bytes> {
    serde_json::to_vec(record).map(Bytes::from).map_err(|err| {
        gateway_error!(
            ErrorKind::SerializationError,
            "Could not serialize document",
            err.to_string(),
            source: err
        )
    })
}

async fn get_document<T>(
    store: &(dyn ObjectStore + Send + Sync),
    bucket: &str,
    key: &str,
) -> GatewayResult<T>
where
    T: DeserializeOwned,
{
    let body = store.get_object(bucket, key).await?;
    Ok(serde_json::from_slice(&body)?)
}

pub async fn get_request(
    store: &(dyn ObjectStore + Send + Sync),
    bucket: &str,
    request_id: &str,
) -> GatewayResult<Request> {
    get_document(store, bucket, &request_key(request_id)).await
}

pub async fn get_sample(
    store: &(dyn ObjectStore + Send + Sync),
    bucket: &str,
    primary_id: &str,
) -> GatewayResult<Sample> {
    get_document(store, bucket, &sample_key(primary_id)).await
}

pub async fn get_external_sample(
    store: &(dyn ObjectStore + Send + Sync),
    bucket: &str,
    primary_id: &str,
) -> GatewayResult<ExternalSample> {
    get_document(store, bucket, &clinical_key(primary_id)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_record_kind() {
        assert_eq!(request_key("12345_A"), "12345_A_request.json");
        assert_eq!(sample_key("12345_A_1"), "12345_A_1_sample.json");
        assert_eq!(clinical_key("P-0001"), "P-0001_clinical.json");
    }
}
