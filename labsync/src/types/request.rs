use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A lab request together with the samples it was submitted with.
///
/// Only the identifying fields are typed. Every other field of the document is kept verbatim in
/// `fields` so that the object written downstream carries the full upstream payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "igoRequestId")]
    pub request_id: String,
    #[serde(default)]
    pub samples: Vec<Sample>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Request {
    /// Detaches the nested samples, leaving the request with an empty sample list.
    pub fn strip_samples(&mut self) -> Vec<Sample> {
        std::mem::take(&mut self.samples)
    }
}

/// A sample belonging to a lab request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(rename = "primaryId")]
    pub primary_id: String,
    #[serde(rename = "sampleName")]
    pub sample_name: String,
    #[serde(rename = "additionalProperties", default)]
    pub additional_properties: SampleProperties,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Sample {
    /// Identifier of the request this sample belongs to.
    pub fn request_id(&self) -> &str {
        &self.additional_properties.request_id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleProperties {
    #[serde(rename = "igoRequestId", default)]
    pub request_id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let document = json!({
            "igoRequestId": "12345_A",
            "projectManagerName": "Doe, Jane",
            "samples": [{
                "primaryId": "12345_A_1",
                "sampleName": "S-1",
                "additionalProperties": { "igoRequestId": "12345_A", "isCmoSample": "true" },
                "tumorOrNormal": "Tumor"
            }]
        });

        let request: Request = serde_json::from_value(document.clone()).unwrap();

        assert_eq!(request.request_id, "12345_A");
        assert_eq!(request.samples[0].request_id(), "12345_A");
        assert_eq!(serde_json::to_value(&request).unwrap(), document);
    }

    #[test]
    fn strip_samples_leaves_empty_list() {
        let mut request: Request = serde_json::from_value(json!({
            "igoRequestId": "1",
            "samples": [
                { "primaryId": "1_1", "sampleName": "A" },
                { "primaryId": "1_2", "sampleName": "B" }
            ]
        }))
        .unwrap();

        let samples = request.strip_samples();

        assert_eq!(samples.len(), 2);
        assert!(request.samples.is_empty());
        assert_eq!(serde_json::to_value(&request).unwrap()["samples"], json!([]));
    }

    #[test]
    fn sample_name_is_required() {
        let err = serde_json::from_value::<Sample>(json!({ "primaryId": "1_1" })).unwrap_err();

        assert!(err.to_string().contains("sampleName"));
    }
}
