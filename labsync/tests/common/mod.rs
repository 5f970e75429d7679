use std::sync::Arc;
use std::time::Duration;

use labsync::concurrency::{ShutdownTx, create_shutdown_channel};
use labsync::dispatch::DispatchState;
use labsync::error::GatewayResult;
use labsync::gateway::Gateway;
use labsync::sinks::{PipelineRun, Sinks};
use labsync::test_utils::broker::MemoryBroker;
use labsync::test_utils::fixtures::gateway_config;
use labsync::test_utils::log::EventLog;
use labsync::test_utils::sinks::{
    MemoryObjectStore, MemoryWarehouse, RecordingNotifier, RecordingPipelineTrigger,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const PIPELINE_NAME: &str = "labsync-dlt";
pub const PIPELINE_ID: &str = "pipeline-1";

/// Which optional sinks a test gateway is built with.
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    pub warehouse: bool,
    pub pipeline: bool,
    pub notifier: bool,
    pub external: bool,
}

pub struct Harness {
    pub log: EventLog,
    pub broker: MemoryBroker,
    pub store: MemoryObjectStore,
    pub warehouse: MemoryWarehouse,
    pub notifier: RecordingNotifier,
    pub pipeline: RecordingPipelineTrigger,
}

impl Harness {
    pub fn new() -> Self {
        let log = EventLog::new();
        Self {
            broker: MemoryBroker::new(log.clone()),
            store: MemoryObjectStore::new(log.clone()),
            warehouse: MemoryWarehouse::new(log.clone()),
            notifier: RecordingNotifier::new(log.clone()),
            pipeline: RecordingPipelineTrigger::new(log.clone(), PIPELINE_NAME, PIPELINE_ID),
            log,
        }
    }

    pub fn sinks(&self, options: Options) -> Sinks {
        let mut sinks = Sinks::new(Arc::new(self.store.clone()));
        if options.warehouse {
            sinks = sinks.with_warehouse(Arc::new(self.warehouse.clone()));
        }
        if options.pipeline {
            sinks = sinks.with_pipeline(
                Arc::new(self.pipeline.clone()),
                PipelineRun {
                    pipeline_name: PIPELINE_NAME.to_string(),
                    idle_timeout: Duration::from_secs(60),
                    running_timeout: Duration::from_secs(60),
                    poll_interval: Duration::from_millis(10),
                },
            );
        }
        if options.notifier {
            sinks = sinks.with_notifier(Arc::new(self.notifier.clone()));
        }
        sinks
    }

    pub async fn start(&self, options: Options) -> RunningGateway {
        let config = gateway_config(options.external);
        let gateway = Gateway::new(
            &config,
            Arc::new(self.broker.clone()),
            self.sinks(options),
        );

        let dispatch = gateway.start().await.unwrap();
        let state = dispatch.state_watcher();
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let handle = tokio::spawn(dispatch.run(shutdown_rx));

        RunningGateway {
            shutdown_tx,
            state,
            handle,
        }
    }
}

pub struct RunningGateway {
    pub shutdown_tx: ShutdownTx,
    pub state: watch::Receiver<DispatchState>,
    pub handle: JoinHandle<GatewayResult<()>>,
}

impl RunningGateway {
    /// Signals shutdown and waits for the drain to finish.
    pub async fn stop(self) -> GatewayResult<()> {
        self.shutdown_tx.shutdown();
        self.handle.await.unwrap()
    }
}
