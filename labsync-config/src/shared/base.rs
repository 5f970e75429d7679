use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// A required string value is empty.
    #[error("`{0}` cannot be empty")]
    Empty(&'static str),
    /// Two per-purpose subject filters are identical, which makes routing ambiguous.
    #[error("subject filters `{0}` and `{1}` are identical")]
    DuplicateSubjectFilter(&'static str, &'static str),
    /// Only one of the two external sample subject filters was configured.
    #[error(
        "`released_external_samples` and `updated_external_samples` must be set together"
    )]
    IncompleteExternalSampleSubjects,
    /// The session duration must be a positive, finite number of seconds.
    #[error("`max_duration_secs` must be positive, got {0}")]
    NonPositiveSessionDuration(f64),
    /// A numeric value that must be non-zero is zero.
    #[error("`{0}` cannot be zero")]
    Zero(&'static str),
    /// The broker would redeliver a message while its delivery may still be waiting.
    #[error("`broker.ack_wait_secs` must exceed the longest delivery wait of {required_ms} ms")]
    AckWaitTooShort { required_ms: u64 },
}
