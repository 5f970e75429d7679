use crate::error::GatewayResult;

/// Posts human readable status messages, such as a chat webhook.
#[async_trait::async_trait]
pub trait Notifier {
    fn name(&self) -> &'static str;

    async fn notify(&self, text: &str) -> GatewayResult<()>;
}
