//! The loop draining every family mailbox into delivery tasks.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::select_all;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::broker::Broker;
use crate::concurrency::{CompletionTracker, Lane, ShutdownRx};
use crate::error::GatewayResult;

/// Lifecycle of a [`DispatchLoop`]. A stopped loop never restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Running,
    Draining,
    Stopped,
}

/// Spawns one delivery task per mailbox item until shutdown.
pub struct DispatchLoop {
    lanes: Vec<Lane>,
    broker: Arc<dyn Broker + Send + Sync>,
    state_tx: watch::Sender<DispatchState>,
}

impl DispatchLoop {
    pub fn new(lanes: Vec<Lane>, broker: Arc<dyn Broker + Send + Sync>) -> Self {
        let (state_tx, _) = watch::channel(DispatchState::Running);
        Self {
            lanes,
            broker,
            state_tx,
        }
    }

    /// Returns a receiver following the loop state.
    pub fn state_watcher(&self) -> watch::Receiver<DispatchState> {
        self.state_tx.subscribe()
    }

    /// Runs until `shutdown_rx` fires or every mailbox is closed.
    ///
    /// Draining stops taking items, waits for every in-flight delivery of every family, and only
    /// then shuts the broker down so that pending acknowledgements still reach it.
    pub async fn run(self, mut shutdown_rx: ShutdownRx) -> GatewayResult<()> {
        let DispatchLoop {
            lanes,
            broker,
            state_tx,
        } = self;

        let families = lanes.iter().map(Lane::family).collect::<Vec<_>>();
        let (trackers, streams): (Vec<CompletionTracker>, Vec<_>) =
            lanes.into_iter().map(Lane::into_parts).unzip();
        let mut dispatches = select_all(streams);

        info!(?families, "dispatch loop started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    info!("shutdown signal received, draining in-flight deliveries");
                    break;
                }

                next = dispatches.next() => {
                    let Some(dispatch) = next else {
                        info!("all mailboxes closed, draining in-flight deliveries");
                        break;
                    };
                    debug!(family = %dispatch.family(), "spawning delivery task");
                    dispatch.spawn();
                }
            }
        }

        state_tx.send_replace(DispatchState::Draining);
        drop(dispatches);

        for tracker in &trackers {
            tracker.close();
        }
        for tracker in &trackers {
            let in_flight = tracker.in_flight();
            if in_flight > 0 {
                info!(family = %tracker.family(), in_flight, "waiting for deliveries");
            }
            tracker.wait().await;
        }

        let result = broker.shutdown().await;
        state_tx.send_replace(DispatchState::Stopped);
        info!("dispatch loop stopped");

        result
    }
}
