use serde_json::Value;

use crate::bail;
use crate::error::{ErrorKind, GatewayResult};
use crate::types::{Request, Sample};

/// Row of the requests table, the document excludes nested samples.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRow {
    pub request_id: String,
    pub document: Value,
}

impl RequestRow {
    /// Builds the row of a request, which must already be stripped of its samples.
    pub fn from_request(request: &Request) -> GatewayResult<Self> {
        Ok(Self {
            request_id: request.request_id.clone(),
            document: serde_json::to_value(request)?,
        })
    }
}

/// Row of the samples table, keyed by request id and sample name.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRow {
    pub request_id: String,
    pub sample_name: String,
    pub primary_id: String,
    pub document: Value,
}

impl SampleRow {
    /// Builds the row of a sample nested in the request `request_id`.
    pub fn for_request(request_id: &str, sample: &Sample) -> GatewayResult<Self> {
        Ok(Self {
            request_id: request_id.to_string(),
            sample_name: sample.sample_name.clone(),
            primary_id: sample.primary_id.clone(),
            document: serde_json::to_value(sample)?,
        })
    }

    /// Builds the row of a standalone sample, keyed by the request id it carries.
    pub fn from_sample(sample: &Sample) -> GatewayResult<Self> {
        if sample.request_id().is_empty() {
            bail!(
                ErrorKind::DecodeFailed,
                "Sample does not name its request",
                format!("sample `{}`", sample.primary_id)
            );
        }

        Self::for_request(sample.request_id(), sample)
    }
}

/// SQL warehouse with a requests table and a samples table.
///
/// Writes are upserts returning the number of rows affected, so a redelivered message re-applies
/// cleanly.
#[async_trait::async_trait]
pub trait Warehouse {
    fn name(&self) -> &'static str;

    async fn upsert_request(&self, row: &RequestRow) -> GatewayResult<u64>;

    /// Upserts every row with a single statement.
    async fn upsert_samples(&self, rows: &[SampleRow]) -> GatewayResult<u64>;

    async fn get_request(&self, request_id: &str) -> GatewayResult<Option<RequestRow>>;

    async fn get_sample(
        &self,
        request_id: &str,
        sample_name: &str,
    ) -> GatewayResult<Option<SampleRow>>;

    /// Deletes a request and its samples, returning the number of rows removed.
    async fn delete_request(&self, request_id: &str) -> GatewayResult<u64>;
}
