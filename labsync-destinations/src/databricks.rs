//! Databricks Delta Live Tables pipelines driven through the workspace REST API.

use labsync::error::{ErrorKind, GatewayResult};
use labsync::sinks::{PipelineState, PipelineTrigger};
use labsync::{bail, gateway_error};
use labsync_config::shared::PipelineConfig;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

const PIPELINES_PATH: &str = "/api/2.0/pipelines";

#[derive(Debug, Deserialize)]
struct ListPipelinesResponse {
    #[serde(default)]
    statuses: Vec<PipelineSummary>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PipelineSummary {
    pipeline_id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct GetPipelineResponse {
    state: String,
}

#[derive(Debug, Deserialize)]
struct StartUpdateResponse {
    update_id: Option<String>,
}

/// Pipeline trigger authenticated with a personal access token.
#[derive(Debug, Clone)]
pub struct DatabricksPipelineTrigger {
    client: reqwest::Client,
    base_url: String,
    token: SecretString,
}

impl DatabricksPipelineTrigger {
    pub fn new(config: &PipelineConfig) -> GatewayResult<Self> {
        Self::with_base_url(workspace_url(&config.host), config.token.clone())
    }

    pub fn with_base_url(base_url: impl Into<String>, token: SecretString) -> GatewayResult<Self> {
        let client = reqwest::Client::builder().build().map_err(|err| {
            gateway_error!(
                ErrorKind::ClientConstructionFailed,
                "Could not build the pipeline client",
                err.to_string(),
                source: err
            )
        })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> GatewayResult<T> {
        let response = request
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|err| {
                gateway_error!(
                    ErrorKind::PipelineTriggerFailed,
                    "Pipeline API request failed",
                    err.to_string(),
                    source: err
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unable to read body>".to_string());
            bail!(
                ErrorKind::PipelineTriggerFailed,
                "Pipeline API returned an error status",
                format!("status {status}: {body}")
            );
        }

        response.json::<T>().await.map_err(|err| {
            gateway_error!(
                ErrorKind::DeserializationError,
                "Could not parse the pipeline API response",
                err.to_string(),
                source: err
            )
        })
    }
}

/// Prefixes `https://` unless the host already carries a scheme.
fn workspace_url(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

#[async_trait::async_trait]
impl PipelineTrigger for DatabricksPipelineTrigger {
    fn name(&self) -> &'static str {
        "databricks"
    }

    async fn find_by_name(&self, name: &str) -> GatewayResult<String> {
        let url = format!("{}{PIPELINES_PATH}", self.base_url);
        let filter = format!("name LIKE '{name}'");
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.client.get(&url).query(&[("filter", filter.as_str())]);
            if let Some(token) = &page_token {
                request = request.query(&[("page_token", token.as_str())]);
            }

            let page: ListPipelinesResponse = self.send(request).await?;
            if let Some(pipeline) = page.statuses.into_iter().find(|p| p.name == name) {
                debug!(
                    pipeline_name = name,
                    pipeline_id = %pipeline.pipeline_id,
                    "pipeline resolved"
                );
                return Ok(pipeline.pipeline_id);
            }

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        bail!(
            ErrorKind::PipelineNotFound,
            "Pipeline not found",
            format!("no pipeline is named `{name}`")
        )
    }

    async fn state(&self, pipeline_id: &str) -> GatewayResult<PipelineState> {
        let url = format!("{}{PIPELINES_PATH}/{pipeline_id}", self.base_url);
        let pipeline: GetPipelineResponse = self.send(self.client.get(url)).await?;

        Ok(PipelineState::parse(&pipeline.state))
    }

    async fn start(&self, pipeline_id: &str) -> GatewayResult<()> {
        let url = format!("{}{PIPELINES_PATH}/{pipeline_id}/updates", self.base_url);
        let update: StartUpdateResponse = self
            .send(self.client.post(url).json(&serde_json::json!({})))
            .await?;
        debug!(pipeline_id, update_id = ?update.update_id, "pipeline update started");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use labsync_telemetry::tracing::init_test_tracing;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn trigger(server: &MockServer) -> DatabricksPipelineTrigger {
        DatabricksPipelineTrigger::with_base_url(
            server.uri(),
            SecretString::new("dapi-token".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn host_gets_https_scheme() {
        assert_eq!(
            workspace_url("dbc-1.cloud.databricks.com"),
            "https://dbc-1.cloud.databricks.com"
        );
        assert_eq!(
            workspace_url("http://localhost:8080"),
            "http://localhost:8080"
        );
    }

    #[tokio::test]
    async fn finds_pipeline_across_pages() {
        init_test_tracing();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PIPELINES_PATH))
            .and(query_param("page_token", "next"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "statuses": [{ "pipeline_id": "p-2", "name": "labsync-dlt" }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(PIPELINES_PATH))
            .and(header("authorization", "Bearer dapi-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "statuses": [{ "pipeline_id": "p-1", "name": "labsync-dlt-staging" }],
                "next_page_token": "next"
            })))
            .mount(&server)
            .await;

        let id = trigger(&server).find_by_name("labsync-dlt").await.unwrap();

        assert_eq!(id, "p-2");
    }

    #[tokio::test]
    async fn unknown_pipeline_is_not_found() {
        init_test_tracing();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PIPELINES_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let err = trigger(&server).find_by_name("missing").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PipelineNotFound);
    }

    #[tokio::test]
    async fn reads_state_and_starts_update() {
        init_test_tracing();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/2.0/pipelines/p-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "pipeline_id": "p-1",
                "state": "IDLE"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/2.0/pipelines/p-1/updates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "update_id": "u-1" })))
            .expect(1)
            .mount(&server)
            .await;

        let trigger = trigger(&server);

        assert_eq!(trigger.state("p-1").await.unwrap(), PipelineState::Idle);
        trigger.start("p-1").await.unwrap();
    }

    #[tokio::test]
    async fn error_status_fails_the_trigger() {
        init_test_tracing();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let err = trigger(&server).start("p-1").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PipelineTriggerFailed);
    }
}
