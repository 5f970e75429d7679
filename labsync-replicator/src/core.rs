use std::sync::Arc;

use labsync::concurrency::create_shutdown_channel;
use labsync::gateway::Gateway;
use labsync::sinks::{PipelineRun, Sinks};
use labsync_config::shared::{BrokerConfig, GatewayConfig, ObjectStoreConfig, SubjectsConfig};
use labsync_destinations::databricks::DatabricksPipelineTrigger;
use labsync_destinations::nats::NatsBroker;
use labsync_destinations::postgres::{PostgresWarehouse, migrate_warehouse};
use labsync_destinations::s3::S3ObjectStore;
use labsync_destinations::webhook::WebhookNotifier;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info};

use crate::error::ReplicatorResult;

/// Builds every configured sink and runs the gateway until SIGINT or SIGTERM.
///
/// A sink that cannot be built fails startup. Once running, only the drain result of the
/// dispatch loop is returned.
pub async fn start_gateway_with_config(config: GatewayConfig) -> ReplicatorResult<()> {
    info!("starting gateway service");

    log_config(&config);

    let sinks = build_sinks(&config).await?;
    let broker = Arc::new(NatsBroker::connect(&config.broker).await?);
    let dispatch = Gateway::new(&config, broker, sinks).start().await?;

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

    // Registered before the loop runs so that a registration failure aborts startup.
    let mut sigterm = signal(SignalKind::terminate())?;
    let shutdown_handle = tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("sigint (ctrl+c) received, shutting down");
            }
            _ = sigterm.recv() => {
                info!("sigterm received, shutting down");
            }
        }

        shutdown_tx.shutdown();
    });

    let result = dispatch.run(shutdown_rx).await;

    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    result?;
    info!("gateway stopped");

    Ok(())
}

async fn build_sinks(config: &GatewayConfig) -> ReplicatorResult<Sinks> {
    let object_store = S3ObjectStore::from_config(&config.object_store.session)?;
    let mut sinks = Sinks::new(Arc::new(object_store));

    if let Some(warehouse) = &config.warehouse {
        migrate_warehouse(warehouse).await?;
        sinks = sinks.with_warehouse(Arc::new(PostgresWarehouse::connect(warehouse).await?));
    }

    if let Some(pipeline) = &config.pipeline {
        sinks = sinks.with_pipeline(
            Arc::new(DatabricksPipelineTrigger::new(pipeline)?),
            PipelineRun::from(pipeline),
        );
    }

    if let Some(notification) = &config.notification {
        sinks = sinks.with_notifier(Arc::new(WebhookNotifier::new(notification)?));
    }

    Ok(sinks)
}

fn log_config(config: &GatewayConfig) {
    log_broker_config(&config.broker);
    log_subjects_config(&config.subjects);
    log_object_store_config(&config.object_store);

    if let Some(warehouse) = &config.warehouse {
        debug!(
            host = warehouse.connection.host,
            port = warehouse.connection.port,
            dbname = warehouse.connection.name,
            username = warehouse.connection.username,
            tls_enabled = warehouse.connection.tls.enabled,
            max_connections = warehouse.max_connections,
            "warehouse config"
        );
    }
    if let Some(pipeline) = &config.pipeline {
        debug!(
            host = pipeline.host,
            pipeline_name = pipeline.pipeline_name,
            idle_timeout_secs = pipeline.idle_timeout_secs,
            running_timeout_secs = pipeline.running_timeout_secs,
            poll_interval_ms = pipeline.poll_interval_ms,
            "pipeline config"
        );
    }
    if let Some(notification) = &config.notification {
        debug!(timeout_secs = notification.timeout_secs, "notification config");
    }
}

fn log_broker_config(config: &BrokerConfig) {
    debug!(
        url = config.url,
        consumer = config.consumer,
        stream = config.stream,
        subject_filter = config.subject_filter,
        tls_enabled = config.tls_cert_path.is_some(),
        connection_timeout_ms = config.connection_timeout_ms,
        ack_wait_secs = config.ack_wait_secs,
        "broker config"
    );
}

fn log_subjects_config(config: &SubjectsConfig) {
    debug!(
        new_request = config.new_request,
        updated_request = config.updated_request,
        updated_sample = config.updated_sample,
        external_samples_enabled = config.external_samples().is_some(),
        "subjects config"
    );
}

fn log_object_store_config(config: &ObjectStoreConfig) {
    debug!(
        request_bucket = config.request_bucket,
        external_sample_bucket = config.external_sample_bucket,
        profile = config.session.profile,
        region = config.session.region,
        max_duration_secs = config.session.max_duration_secs,
        settle_interval_ms = config.session.settle_interval_ms,
        "object store config"
    );
}
