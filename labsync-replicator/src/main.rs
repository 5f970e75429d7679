//! Lab-data gateway service binary.
//!
//! Consumes request and sample events from the broker and replicates them into the object store,
//! the warehouse and the downstream pipeline until a shutdown signal drains it.

use labsync_config::shared::GatewayConfig;
use labsync_telemetry::tracing::init_tracing;
use tracing::error;

use crate::config::load_gateway_config;
use crate::core::start_gateway_with_config;
use crate::error::{ReplicatorError, ReplicatorResult};

mod config;
mod core;
mod error;

fn main() -> ReplicatorResult<()> {
    let gateway_config = load_gateway_config()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME")).map_err(ReplicatorError::config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(gateway_config))?;

    Ok(())
}

async fn async_main(gateway_config: GatewayConfig) -> ReplicatorResult<()> {
    if let Err(err) = start_gateway_with_config(gateway_config).await {
        error!("{err}");
        eprint!("{}", err.render_report());

        return Err(err);
    }

    Ok(())
}
