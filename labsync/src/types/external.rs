use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A sample sequenced outside the lab, delivered in binary batches.
#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
pub struct ExternalSample {
    #[prost(string, tag = "1")]
    #[serde(rename = "primaryId")]
    pub primary_id: String,
    #[prost(string, tag = "2")]
    #[serde(rename = "cmoSampleName")]
    pub cmo_sample_name: String,
    #[prost(btree_map = "string, string", tag = "3")]
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// Wire message wrapping a batch of external samples.
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct ExternalSampleBatch {
    #[prost(message, repeated, tag = "1")]
    pub samples: Vec<ExternalSample>,
}

/// Joins the sample names of a batch with `", "`.
pub fn external_sample_names(samples: &[ExternalSample]) -> String {
    samples
        .iter()
        .map(|sample| sample.cmo_sample_name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_comma_joined() {
        let samples = vec![
            ExternalSample {
                primary_id: "P-1".to_string(),
                cmo_sample_name: "C-1".to_string(),
                attributes: BTreeMap::new(),
            },
            ExternalSample {
                primary_id: "P-2".to_string(),
                cmo_sample_name: "C-2".to_string(),
                attributes: BTreeMap::new(),
            },
        ];

        assert_eq!(external_sample_names(&samples), "C-1, C-2");
        assert_eq!(external_sample_names(&[]), "");
    }
}
