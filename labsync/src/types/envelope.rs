use tracing::Span;

use crate::bail;
use crate::broker::InboundMessage;
use crate::error::{ErrorKind, GatewayResult};

/// Decoded records of one broker message, together with the message itself.
///
/// An envelope always holds at least one record. For update families the last record is the most
/// recently changed one.
#[derive(Debug)]
pub struct TypedEnvelope<T> {
    records: Vec<T>,
    source: InboundMessage,
    span: Span,
}

impl<T> TypedEnvelope<T> {
    /// Wraps `records`, failing with [`ErrorKind::EmptyBatch`] when there are none.
    pub fn new(records: Vec<T>, source: InboundMessage, span: Span) -> GatewayResult<Self> {
        if records.is_empty() {
            bail!(
                ErrorKind::EmptyBatch,
                "Message carried no records",
                format!("subject `{}`", source.subject())
            );
        }

        Ok(Self {
            records,
            source,
            span,
        })
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn first(&self) -> &T {
        &self.records[0]
    }

    /// The authoritative record of an update batch.
    pub fn latest(&self) -> &T {
        &self.records[self.records.len() - 1]
    }

    pub fn source(&self) -> &InboundMessage {
        &self.source
    }

    /// The `message_received` span opened by the router.
    pub fn span(&self) -> &Span {
        &self.span
    }
}
