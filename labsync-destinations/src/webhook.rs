//! Chat notifications posted to an incoming webhook.

use std::time::Duration;

use labsync::error::{ErrorKind, GatewayResult};
use labsync::sinks::Notifier;
use labsync::{bail, gateway_error};
use labsync_config::shared::NotificationConfig;
use serde::Serialize;
use tracing::{debug, error};

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    text: &'a str,
}

/// Posts `{"text": ...}` to the configured webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(config: &NotificationConfig) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| {
                gateway_error!(
                    ErrorKind::ClientConstructionFailed,
                    "Could not build the webhook client",
                    err.to_string(),
                    source: err
                )
            })?;

        Ok(Self {
            client,
            url: config.webhook_url.clone(),
        })
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn notify(&self, text: &str) -> GatewayResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookMessage { text })
            .send()
            .await
            .map_err(|err| {
                gateway_error!(
                    ErrorKind::NotificationFailed,
                    "Webhook request failed",
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
            error!(%status, %body, "webhook rejected notification");
            bail!(
                ErrorKind::NotificationFailed,
                "Webhook returned an error status",
                format!("status {status}: {body}")
            );
        }

        debug!(%status, "notification posted");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use labsync_telemetry::tracing::init_test_tracing;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn notifier(server: &MockServer) -> WebhookNotifier {
        WebhookNotifier::new(&NotificationConfig {
            webhook_url: format!("{}/hooks/labsync", server.uri()),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn posts_text_as_json() {
        init_test_tracing();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/labsync"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({ "text": "Updated sample" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        notifier(&server).notify("Updated sample").await.unwrap();
    }

    #[tokio::test]
    async fn non_success_status_is_a_notification_failure() {
        init_test_tracing();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = notifier(&server).notify("hello").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotificationFailed);
        assert!(err.detail().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn slow_webhook_times_out() {
        init_test_tracing();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(&NotificationConfig {
            webhook_url: server.uri(),
            timeout_secs: 1,
        })
        .unwrap();
        let err = notifier.notify("hello").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotificationFailed);
    }
}
