use labsync_config::load_config;
use labsync_config::shared::GatewayConfig;

use crate::error::{ReplicatorError, ReplicatorResult};

/// Loads the gateway configuration and validates it before any client is built.
pub fn load_gateway_config() -> ReplicatorResult<GatewayConfig> {
    let config = load_config::<GatewayConfig>().map_err(ReplicatorError::config)?;
    config.validate().map_err(ReplicatorError::config)?;

    Ok(config)
}
