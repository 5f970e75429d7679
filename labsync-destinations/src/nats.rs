//! NATS JetStream broker holding one durable pull consumer.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_nats::jetstream::{self, consumer::AckPolicy, consumer::pull};
use futures::StreamExt;
use labsync::broker::{Acknowledger, Broker, InboundMessage, MessageHandler};
use labsync::error::{ErrorKind, GatewayResult};
use labsync::{bail, gateway_error};
use labsync_config::shared::BrokerConfig;
use secrecy::ExposeSecret;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Acknowledges one JetStream message.
struct JetStreamAcker {
    message: jetstream::Message,
}

#[async_trait::async_trait]
impl Acknowledger for JetStreamAcker {
    async fn ack(&self) -> GatewayResult<()> {
        self.message.ack().await.map_err(|err| {
            gateway_error!(
                ErrorKind::AcknowledgeFailed,
                "Could not acknowledge message",
                format!("{}: {err}", self.message.subject)
            )
        })
    }
}

fn inbound(message: jetstream::Message) -> InboundMessage {
    let subject = message.subject.to_string();
    let payload = message.payload.clone();
    InboundMessage::new(subject, payload, Box::new(JetStreamAcker { message }))
}

fn connect_options(config: &BrokerConfig) -> GatewayResult<async_nats::ConnectOptions> {
    let mut options = async_nats::ConnectOptions::new()
        .name(config.consumer.as_str())
        .connection_timeout(Duration::from_millis(config.connection_timeout_ms));

    if let Some(password) = &config.password {
        options = options.user_and_password(
            config.consumer.clone(),
            password.expose_secret().to_string(),
        );
    }

    match (&config.tls_cert_path, &config.tls_key_path) {
        (Some(cert), Some(key)) => {
            options = options
                .require_tls(true)
                .add_client_certificate(PathBuf::from(cert), PathBuf::from(key));
        }
        (None, None) => {}
        _ => bail!(
            ErrorKind::ConfigError,
            "Client certificate and key must be configured together"
        ),
    }

    Ok(options)
}

fn consumer_config(consumer: &str, subject_filter: &str, ack_wait: Duration) -> pull::Config {
    pull::Config {
        durable_name: Some(consumer.to_string()),
        filter_subject: subject_filter.to_string(),
        ack_policy: AckPolicy::Explicit,
        ack_wait,
        ..Default::default()
    }
}

/// Client handles of an open connection, which closes once both are dropped.
struct Connection {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

/// Broker delivering JetStream messages one at a time to the subscription handler.
///
/// The handler is awaited before the next message is pulled, so a handler waiting on a full
/// mailbox throttles the consumer. The durable consumer is created with the configured ack wait.
///
/// [`Broker::shutdown`] stops the consumer task, flushes and releases the connection. Later
/// subscriptions fail and later shutdowns return at once.
pub struct NatsBroker {
    connection: RwLock<Option<Connection>>,
    stream: String,
    ack_wait: Duration,
    subscribed: AtomicBool,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl NatsBroker {
    pub async fn connect(config: &BrokerConfig) -> GatewayResult<Self> {
        info!(url = %config.url, consumer = %config.consumer, "connecting to broker");

        let client = connect_options(config)?
            .connect(config.url.as_str())
            .await
            .map_err(|err| {
                gateway_error!(
                    ErrorKind::BrokerConnectionFailed,
                    "Could not connect to the broker",
                    config.url.clone(),
                    source: err
                )
            })?;
        let jetstream = jetstream::new(client.clone());

        Ok(Self::with_connection(
            Some(Connection { client, jetstream }),
            config,
        ))
    }

    fn with_connection(connection: Option<Connection>, config: &BrokerConfig) -> Self {
        Self {
            connection: RwLock::new(connection),
            stream: config.stream.clone(),
            ack_wait: Duration::from_secs(config.ack_wait_secs),
            subscribed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }
}

#[async_trait::async_trait]
impl Broker for NatsBroker {
    async fn subscribe(
        &self,
        consumer: &str,
        subject_filter: &str,
        handler: Arc<dyn MessageHandler + Send + Sync>,
    ) -> GatewayResult<()> {
        if self.subscribed.swap(true, Ordering::AcqRel) {
            bail!(
                ErrorKind::BrokerSubscribeFailed,
                "A subscription is already active",
                consumer
            );
        }

        let Some(jetstream) = self
            .connection
            .read()
            .await
            .as_ref()
            .map(|connection| connection.jetstream.clone())
        else {
            bail!(
                ErrorKind::BrokerSubscribeFailed,
                "The broker connection is closed",
                consumer
            );
        };

        let stream = jetstream.get_stream(&self.stream).await.map_err(|err| {
            gateway_error!(
                ErrorKind::BrokerSubscribeFailed,
                "Could not find the stream",
                self.stream.clone(),
                source: err
            )
        })?;
        let durable = stream
            .get_or_create_consumer(
                consumer,
                consumer_config(consumer, subject_filter, self.ack_wait),
            )
            .await
            .map_err(|err| {
                gateway_error!(
                    ErrorKind::BrokerSubscribeFailed,
                    "Could not create the durable consumer",
                    consumer,
                    source: err
                )
            })?;
        let mut messages = durable.messages().await.map_err(|err| {
            gateway_error!(
                ErrorKind::BrokerSubscribeFailed,
                "Could not open the message stream",
                consumer,
                source: err
            )
        })?;

        info!(
            stream = %self.stream,
            consumer,
            subject_filter,
            ack_wait_secs = self.ack_wait.as_secs(),
            "subscribed"
        );

        let cancel = self.cancel.clone();
        self.tasks.spawn(async move {
            loop {
                let next = tokio::select! {
                    biased;

                    _ = cancel.cancelled() => break,
                    next = messages.next() => next,
                };

                match next {
                    Some(Ok(message)) => handler.handle(inbound(message)).await,
                    Some(Err(err)) => warn!(error = %err, "failed to receive message"),
                    None => {
                        warn!("message stream ended");
                        break;
                    }
                }
            }
            debug!("subscription stopped");
        });

        Ok(())
    }

    async fn shutdown(&self) -> GatewayResult<()> {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;

        let Some(connection) = self.connection.write().await.take() else {
            return Ok(());
        };

        let flushed = connection.client.flush().await;
        drop(connection);
        info!("broker connection closed");

        flushed.map_err(|err| {
            gateway_error!(
                ErrorKind::BrokerConnectionFailed,
                "Could not flush the broker connection",
                err.to_string(),
                source: err
            )
        })
    }
}
