//! Error type shared by every gateway component.
//!
//! [`GatewayError`] classifies failures with an [`ErrorKind`], keeps a static description for
//! stable grouping, an optional dynamic detail, the originating error and the callsite where it
//! was raised.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::Location;
use std::sync::Arc;

/// Result alias used across the gateway.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Opaque error raised by gateway operations.
///
/// Build it with [`crate::gateway_error!`] or return it early with [`crate::bail!`].
#[derive(Debug, Clone)]
pub struct GatewayError {
    payload: Box<ErrorPayload>,
}

/// Failure categories, grouped by the component raising them.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Decoding
    DecodeFailed,
    UnquoteFailed,
    EmptyBatch,

    // Object store and its session
    ObjectStoreWriteFailed,
    ObjectStoreReadFailed,
    ObjectStoreDeleteFailed,
    CredentialRefreshFailed,
    ClientConstructionFailed,

    // Warehouse
    WarehouseQueryFailed,
    RowCountMismatch,

    // Pipeline trigger
    PipelineNotFound,
    PipelineTimeout,
    PipelineTriggerFailed,

    // Notification
    NotificationFailed,

    // Broker
    BrokerConnectionFailed,
    BrokerSubscribeFailed,
    AcknowledgeFailed,

    // Dispatch
    QueueClosed,
    DeliveryTaskPanic,
    InvalidState,

    // Configuration, IO and serialization
    ConfigError,
    IoError,
    SerializationError,
    DeserializationError,
}

impl GatewayError {
    #[track_caller]
    pub fn new(kind: ErrorKind, description: &'static str) -> Self {
        GatewayError::build(kind, Cow::Borrowed(description), None, None)
    }

    pub fn kind(&self) -> ErrorKind {
        self.payload.kind
    }

    pub fn description(&self) -> &str {
        &self.payload.description
    }

    pub fn detail(&self) -> Option<&str> {
        self.payload.detail.as_deref()
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.payload.backtrace
    }

    pub fn location(&self) -> &'static Location<'static> {
        self.payload.location
    }

    /// Sets the dynamic detail shown under the headline.
    pub fn with_detail(mut self, detail: impl Into<Cow<'static, str>>) -> Self {
        self.payload.detail = Some(detail.into());
        self
    }

    /// Attaches the originating error, exposed through [`error::Error::source`].
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.payload.source = Some(Arc::new(source));
        self
    }

    #[track_caller]
    fn build(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        GatewayError {
            payload: Box::new(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for GatewayError {
    fn eq(&self, other: &GatewayError) -> bool {
        self.payload.kind == other.payload.kind
    }
}

impl Hash for GatewayError {
    /// Hashes only the kind and static description so that occurrences of the same failure
    /// group together regardless of detail, location or source.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.payload.kind.hash(state);
        self.payload.description.hash(state);
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload = &self.payload;
        let location = payload.location;
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            payload.kind,
            payload.description,
            location.file(),
            location.line(),
            location.column()
        )?;

        if let Some(detail) = payload.detail.as_deref() {
            if detail.trim().is_empty() {
                write!(f, "\n  Detail: <empty>")?;
            } else {
                write_block(f, "Detail", detail)?;
            }
        }

        let backtrace = payload.backtrace.to_string();
        if !backtrace.trim().is_empty() {
            write_block(f, "Backtrace", &backtrace)?;
        }

        Ok(())
    }
}

impl error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.payload
            .source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn error::Error + 'static))
    }
}

/// Writes a titled multi-line block, indented under the error headline.
fn write_block(f: &mut fmt::Formatter<'_>, title: &str, body: &str) -> fmt::Result {
    write!(f, "\n  {title}:")?;
    for line in body.lines() {
        if line.trim().is_empty() {
            write!(f, "\n    ")?;
        } else {
            write!(f, "\n    {line}")?;
        }
    }

    Ok(())
}

impl From<std::io::Error> for GatewayError {
    #[track_caller]
    fn from(err: std::io::Error) -> GatewayError {
        let detail = err.to_string();
        GatewayError::build(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Maps syntax and data errors to [`ErrorKind::DeserializationError`].
impl From<serde_json::Error> for GatewayError {
    #[track_caller]
    fn from(err: serde_json::Error) -> GatewayError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        GatewayError::build(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<prost::DecodeError> for GatewayError {
    #[track_caller]
    fn from(err: prost::DecodeError) -> GatewayError {
        let detail = err.to_string();
        GatewayError::build(
            ErrorKind::DecodeFailed,
            Cow::Borrowed("Protobuf decoding failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<std::str::Utf8Error> for GatewayError {
    #[track_caller]
    fn from(err: std::str::Utf8Error) -> GatewayError {
        let detail = err.to_string();
        GatewayError::build(
            ErrorKind::DecodeFailed,
            Cow::Borrowed("Payload is not valid UTF-8"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<tokio::time::error::Elapsed> for GatewayError {
    #[track_caller]
    fn from(err: tokio::time::error::Elapsed) -> GatewayError {
        GatewayError::build(
            ErrorKind::PipelineTimeout,
            Cow::Borrowed("Timed out waiting for the pipeline"),
            None,
            Some(Arc::new(err)),
        )
    }
}
