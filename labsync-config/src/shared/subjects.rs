use serde::Deserialize;

use crate::shared::ValidationError;

/// Per-purpose subject filters used to classify inbound messages.
#[derive(Debug, Clone, Deserialize)]
pub struct SubjectsConfig {
    pub new_request: String,
    pub updated_request: String,
    pub updated_sample: String,
    pub released_external_samples: Option<String>,
    pub updated_external_samples: Option<String>,
}

impl SubjectsConfig {
    /// Returns both external sample filters when the external sample families are enabled.
    pub fn external_samples(&self) -> Option<(&str, &str)> {
        match (&self.released_external_samples, &self.updated_external_samples) {
            (Some(released), Some(updated)) => Some((released.as_str(), updated.as_str())),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.released_external_samples.is_some() != self.updated_external_samples.is_some() {
            return Err(ValidationError::IncompleteExternalSampleSubjects);
        }

        let mut filters = vec![
            ("new_request", self.new_request.as_str()),
            ("updated_request", self.updated_request.as_str()),
            ("updated_sample", self.updated_sample.as_str()),
        ];
        if let Some((released, updated)) = self.external_samples() {
            filters.push(("released_external_samples", released));
            filters.push(("updated_external_samples", updated));
        }

        for (index, (name, filter)) in filters.iter().enumerate() {
            if filter.trim().is_empty() {
                return Err(ValidationError::Empty(*name));
            }
            if let Some((other, _)) = filters[..index].iter().find(|(_, seen)| seen == filter) {
                return Err(ValidationError::DuplicateSubjectFilter(*other, *name));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subjects() -> SubjectsConfig {
        SubjectsConfig {
            new_request: "LABSYNC.request.new".to_string(),
            updated_request: "LABSYNC.request.update".to_string(),
            updated_sample: "LABSYNC.sample.update".to_string(),
            released_external_samples: None,
            updated_external_samples: None,
        }
    }

    #[test]
    fn accepts_core_filters_without_external_samples() {
        assert_eq!(subjects().validate(), Ok(()));
        assert!(subjects().external_samples().is_none());
    }

    #[test]
    fn rejects_duplicate_filters() {
        let mut config = subjects();
        config.updated_sample = config.updated_request.clone();

        assert_eq!(
            config.validate(),
            Err(ValidationError::DuplicateSubjectFilter(
                "updated_request",
                "updated_sample"
            ))
        );
    }

    #[test]
    fn rejects_half_configured_external_samples() {
        let mut config = subjects();
        config.released_external_samples = Some("LABSYNC.external.release".to_string());

        assert_eq!(
            config.validate(),
            Err(ValidationError::IncompleteExternalSampleSubjects)
        );
    }

    #[test]
    fn rejects_empty_filter() {
        let mut config = subjects();
        config.new_request = " ".to_string();

        assert_eq!(config.validate(), Err(ValidationError::Empty("new_request")));
    }
}
