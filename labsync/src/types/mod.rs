//! Domain records carried by broker messages.

mod envelope;
mod external;
mod request;

use std::fmt;

pub use envelope::TypedEnvelope;
pub use external::{ExternalSample, ExternalSampleBatch, external_sample_names};
pub use request::{Request, Sample, SampleProperties};

/// The fixed set of event types handled by the gateway.
///
/// Each family owns one mailbox and one completion tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageFamily {
    NewRequest,
    UpdatedRequest,
    UpdatedSample,
    ReleasedExternalSamples,
    UpdatedExternalSamples,
}

impl MessageFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageFamily::NewRequest => "new_request",
            MessageFamily::UpdatedRequest => "updated_request",
            MessageFamily::UpdatedSample => "updated_sample",
            MessageFamily::ReleasedExternalSamples => "released_external_samples",
            MessageFamily::UpdatedExternalSamples => "updated_external_samples",
        }
    }
}

impl fmt::Display for MessageFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
