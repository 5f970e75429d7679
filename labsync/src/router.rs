//! Classification of broker messages into family mailboxes.

use labsync_config::shared::SubjectsConfig;
use tracing::{Span, debug, error, info, info_span, warn};

use crate::broker::{InboundMessage, MessageHandler};
use crate::codec::{self, Decoded};
use crate::concurrency::MailboxSender;
use crate::error::{ErrorKind, GatewayResult};
use crate::gateway_error;
use crate::types::{ExternalSample, MessageFamily, Request, Sample, TypedEnvelope};

/// A subject filter using the broker wildcard syntax.
///
/// `*` matches exactly one token and a trailing `>` matches one or more tokens. A filter without
/// wildcards matches only the identical subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectFilter(String);

impl SubjectFilter {
    pub fn new(filter: impl Into<String>) -> Self {
        Self(filter.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, subject: &str) -> bool {
        let mut subject_tokens = subject.split('.');
        let mut filter_tokens = self.0.split('.').peekable();

        while let Some(filter_token) = filter_tokens.next() {
            if filter_token == ">" && filter_tokens.peek().is_none() {
                return subject_tokens.next().is_some_and(|token| !token.is_empty());
            }

            match subject_tokens.next() {
                Some(token) if filter_token == "*" && !token.is_empty() => {}
                Some(token) if filter_token == token => {}
                _ => return false,
            }
        }

        subject_tokens.next().is_none()
    }
}

/// Senders of the family mailboxes the router feeds.
///
/// External sample senders are only present when those families are enabled.
#[derive(Debug, Clone)]
pub struct RouterLanes {
    pub new_request: MailboxSender<TypedEnvelope<Request>>,
    pub updated_request: MailboxSender<TypedEnvelope<Request>>,
    pub updated_sample: MailboxSender<TypedEnvelope<Sample>>,
    pub released_external_samples: Option<MailboxSender<TypedEnvelope<ExternalSample>>>,
    pub updated_external_samples: Option<MailboxSender<TypedEnvelope<ExternalSample>>>,
}

/// What the router did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// No filter matched, the message was acknowledged.
    Ignored,
    /// The envelope was placed in the family mailbox.
    Enqueued(MessageFamily),
    /// Decoding or enqueueing failed, the message was left unacknowledged.
    Rejected(MessageFamily),
}

/// The broker subscription callback.
#[derive(Debug)]
pub struct SubscriptionRouter {
    routes: Vec<(SubjectFilter, MessageFamily)>,
    lanes: RouterLanes,
}

impl SubscriptionRouter {
    /// Builds the routes in configuration order, the first matching filter wins.
    pub fn new(subjects: &SubjectsConfig, lanes: RouterLanes) -> Self {
        let mut routes = vec![
            (
                SubjectFilter::new(&subjects.new_request),
                MessageFamily::NewRequest,
            ),
            (
                SubjectFilter::new(&subjects.updated_request),
                MessageFamily::UpdatedRequest,
            ),
            (
                SubjectFilter::new(&subjects.updated_sample),
                MessageFamily::UpdatedSample,
            ),
        ];

        if let Some((released, updated)) = subjects.external_samples()
            && lanes.released_external_samples.is_some()
            && lanes.updated_external_samples.is_some()
        {
            routes.push((
                SubjectFilter::new(released),
                MessageFamily::ReleasedExternalSamples,
            ));
            routes.push((
                SubjectFilter::new(updated),
                MessageFamily::UpdatedExternalSamples,
            ));
        }

        Self { routes, lanes }
    }

    pub fn classify(&self, subject: &str) -> Option<MessageFamily> {
        self.routes
            .iter()
            .find(|(filter, _)| filter.matches(subject))
            .map(|(_, family)| *family)
    }

    /// Classifies, decodes and enqueues `message`.
    ///
    /// Waits while the family mailbox is full. Messages without a matching filter are
    /// acknowledged at once, messages failing to decode are never acknowledged.
    pub async fn route(&self, message: InboundMessage) -> RouteOutcome {
        let Some(family) = self.classify(message.subject()) else {
            debug!(subject = %message.subject(), "no route for subject, acknowledging");
            message.ack().await;
            return RouteOutcome::Ignored;
        };

        let span = info_span!("message_received", subject = %message.subject(), %family);

        let decoded = match codec::decode(family, message.payload()) {
            Ok(decoded) => decoded,
            Err(err) => {
                span.in_scope(|| {
                    error!(error = %err, "failed to decode message, leaving it unacknowledged")
                });
                return RouteOutcome::Rejected(family);
            }
        };
        span.in_scope(|| info!(records = decoded.len(), "message decoded"));

        match self.enqueue(family, decoded, message, span.clone()).await {
            Ok(()) => {
                span.in_scope(|| debug!("handed off to dispatch"));
                RouteOutcome::Enqueued(family)
            }
            Err(err) => {
                span.in_scope(|| warn!(error = %err, "failed to enqueue message"));
                RouteOutcome::Rejected(family)
            }
        }
    }

    async fn enqueue(
        &self,
        family: MessageFamily,
        decoded: Decoded,
        message: InboundMessage,
        span: Span,
    ) -> GatewayResult<()> {
        match (family, decoded) {
            (MessageFamily::NewRequest, Decoded::Requests(records)) => {
                forward(&self.lanes.new_request, records, message, span).await
            }
            (MessageFamily::UpdatedRequest, Decoded::Requests(records)) => {
                forward(&self.lanes.updated_request, records, message, span).await
            }
            (MessageFamily::UpdatedSample, Decoded::Samples(records)) => {
                forward(&self.lanes.updated_sample, records, message, span).await
            }
            (MessageFamily::ReleasedExternalSamples, Decoded::ExternalSamples(records)) => {
                let sender = external_lane(&self.lanes.released_external_samples, family)?;
                forward(sender, records, message, span).await
            }
            (MessageFamily::UpdatedExternalSamples, Decoded::ExternalSamples(records)) => {
                let sender = external_lane(&self.lanes.updated_external_samples, family)?;
                forward(sender, records, message, span).await
            }
            (family, _) => Err(gateway_error!(
                ErrorKind::InvalidState,
                "Decoded records do not match the message family",
                format!("family `{family}`")
            )),
        }
    }
}

async fn forward<T>(
    sender: &MailboxSender<TypedEnvelope<T>>,
    records: Vec<T>,
    message: InboundMessage,
    span: Span,
) -> GatewayResult<()> {
    let envelope = TypedEnvelope::new(records, message, span)?;
    sender.send(envelope).await
}

fn external_lane(
    lane: &Option<MailboxSender<TypedEnvelope<ExternalSample>>>,
    family: MessageFamily,
) -> GatewayResult<&MailboxSender<TypedEnvelope<ExternalSample>>> {
    lane.as_ref().ok_or_else(|| {
        gateway_error!(
            ErrorKind::InvalidState,
            "External sample families are disabled",
            format!("family `{family}`")
        )
    })
}

#[async_trait::async_trait]
impl MessageHandler for SubscriptionRouter {
    async fn handle(&self, message: InboundMessage) {
        self.route(message).await;
    }
}
