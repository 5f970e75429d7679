//! S3 object store with a time-boxed client session.
//!
//! Every operation acquires the client from a [`SessionManager`], so an expired session is
//! renewed by the first operation that notices it.

use std::sync::Arc;

use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use labsync::error::{ErrorKind, GatewayResult};
use labsync::session::{
    ClientFactory, CommandCredentialRefresher, CredentialRefresher, SessionManager,
    SessionSettings,
};
use labsync::sinks::ObjectStore;
use labsync::{bail, gateway_error};
use labsync_config::shared::SessionConfig;
use tracing::debug;

/// Builds S3 clients bound to a shared credentials profile and region.
#[derive(Debug, Clone)]
pub struct S3ClientFactory {
    profile: String,
    region: String,
    endpoint_url: Option<String>,
}

impl S3ClientFactory {
    pub fn new(profile: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            region: region.into(),
            endpoint_url: None,
        }
    }

    /// Targets an S3 compatible endpoint instead of AWS, using path style addressing.
    pub fn with_endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }
}

#[async_trait::async_trait]
impl ClientFactory for S3ClientFactory {
    type Client = Client;

    async fn build(&self) -> GatewayResult<Client> {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .profile_name(&self.profile)
            .region(Region::new(self.region.clone()))
            .load()
            .await;

        if sdk_config.credentials_provider().is_none() {
            bail!(
                ErrorKind::ClientConstructionFailed,
                "No credentials provider for the object store profile",
                format!("profile `{}`", self.profile)
            );
        }

        let mut config = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint_url) = &self.endpoint_url {
            config = config.endpoint_url(endpoint_url).force_path_style(true);
        }
        debug!(profile = %self.profile, region = %self.region, "object store client built");

        Ok(Client::from_conf(config.build()))
    }
}

/// Object store writing documents to S3 buckets.
pub struct S3ObjectStore<F: ClientFactory<Client = Client> = S3ClientFactory> {
    sessions: Arc<SessionManager<F>>,
}

impl S3ObjectStore<S3ClientFactory> {
    /// Builds a store whose sessions refresh credentials with the configured command.
    pub fn from_config(config: &SessionConfig) -> GatewayResult<Self> {
        let refresher = Arc::new(CommandCredentialRefresher::new(
            &config.credential_refresh_command,
        ));
        let factory = S3ClientFactory::new(&config.profile, &config.region);

        Ok(Self::new(Arc::new(SessionManager::new(
            refresher,
            factory,
            SessionSettings::try_from(config)?,
        ))))
    }
}

impl<F> S3ObjectStore<F>
where
    F: ClientFactory<Client = Client> + Send + Sync,
{
    pub fn new(sessions: Arc<SessionManager<F>>) -> Self {
        Self { sessions }
    }

    pub fn with_refresher(
        refresher: Arc<dyn CredentialRefresher + Send + Sync>,
        factory: F,
        settings: SessionSettings,
    ) -> Self {
        Self::new(Arc::new(SessionManager::new(refresher, factory, settings)))
    }

    pub fn sessions(&self) -> &Arc<SessionManager<F>> {
        &self.sessions
    }
}

#[async_trait::async_trait]
impl<F> ObjectStore for S3ObjectStore<F>
where
    F: ClientFactory<Client = Client> + Send + Sync,
{
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        body: Bytes,
    ) -> GatewayResult<()> {
        let client = self.sessions.acquire_client().await?;
        client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| {
                gateway_error!(
                    ErrorKind::ObjectStoreWriteFailed,
                    "Could not write object",
                    format!("{bucket}/{key}: {}", DisplayErrorContext(&err))
                )
            })?;
        debug!(bucket, key, "object written");

        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> GatewayResult<Bytes> {
        let client = self.sessions.acquire_client().await?;
        let output = client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                gateway_error!(
                    ErrorKind::ObjectStoreReadFailed,
                    "Could not read object",
                    format!("{bucket}/{key}: {}", DisplayErrorContext(&err))
                )
            })?;

        let body = output.body.collect().await.map_err(|err| {
            gateway_error!(
                ErrorKind::ObjectStoreReadFailed,
                "Could not read object body",
                format!("{bucket}/{key}: {err}")
            )
        })?;

        Ok(body.into_bytes())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> GatewayResult<()> {
        let client = self.sessions.acquire_client().await?;
        client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                gateway_error!(
                    ErrorKind::ObjectStoreDeleteFailed,
                    "Could not delete object",
                    format!("{bucket}/{key}: {}", DisplayErrorContext(&err))
                )
            })?;
        debug!(bucket, key, "object deleted");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use aws_sdk_s3::config::retry::RetryConfig;
    use aws_sdk_s3::config::{Credentials, Region};
    use labsync::sinks::{JSON_CONTENT_TYPE, get_request};
    use labsync::test_utils::fixtures::request;
    use labsync_telemetry::tracing::init_test_tracing;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[derive(Default)]
    struct CountingRefresher {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CredentialRefresher for CountingRefresher {
        async fn refresh(&self) -> GatewayResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Static credentials against a mock endpoint.
    struct MockEndpointFactory {
        endpoint_url: String,
    }

    #[async_trait::async_trait]
    impl ClientFactory for MockEndpointFactory {
        type Client = Client;

        async fn build(&self) -> GatewayResult<Client> {
            let config = aws_sdk_s3::config::Builder::new()
                .behavior_version(BehaviorVersion::latest())
                .region(Region::new("us-east-1"))
                .credentials_provider(Credentials::new("key", "secret", None, None, "test"))
                .endpoint_url(&self.endpoint_url)
                .force_path_style(true)
                .retry_config(RetryConfig::disabled())
                .build();

            Ok(Client::from_conf(config))
        }
    }

    fn store(server: &MockServer) -> (S3ObjectStore<MockEndpointFactory>, Arc<CountingRefresher>) {
        let refresher = Arc::new(CountingRefresher::default());
        let store = S3ObjectStore::with_refresher(
            refresher.clone(),
            MockEndpointFactory {
                endpoint_url: server.uri(),
            },
            SessionSettings {
                max_duration: Duration::from_secs(3600),
                settle_interval: Duration::ZERO,
            },
        );
        (store, refresher)
    }

    #[tokio::test]
    async fn puts_json_documents_with_one_session() {
        init_test_tracing();
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/requests/R1_request.json"))
            .and(header("content-type", JSON_CONTENT_TYPE))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let (store, refresher) = store(&server);
        for _ in 0..2 {
            store
                .put_object(
                    "requests",
                    "R1_request.json",
                    JSON_CONTENT_TYPE,
                    Bytes::from_static(b"{}"),
                )
                .await
                .unwrap();
        }

        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reads_back_stored_documents() {
        init_test_tracing();
        let server = MockServer::start().await;
        let original = request("R1", &[]);
        Mock::given(method("GET"))
            .and(path("/requests/R1_request.json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(serde_json::to_vec(&original).unwrap()),
            )
            .mount(&server)
            .await;

        let (store, _) = store(&server);
        let read = get_request(&store, "requests", "R1").await.unwrap();

        assert_eq!(read, original);
    }

    #[tokio::test]
    async fn failed_put_is_a_write_failure() {
        init_test_tracing();
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (store, _) = store(&server);
        let err = store
            .put_object("requests", "R1_request.json", JSON_CONTENT_TYPE, Bytes::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ObjectStoreWriteFailed);
        assert!(err.detail().unwrap().starts_with("requests/R1_request.json"));
    }

    #[tokio::test]
    async fn deletes_objects() {
        init_test_tracing();
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/clinical/P-1_clinical.json"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let (store, _) = store(&server);

        store.delete_object("clinical", "P-1_clinical.json").await.unwrap();
    }
}
