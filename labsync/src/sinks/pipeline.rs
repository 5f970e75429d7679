use std::fmt;
use std::time::Duration;

use labsync_config::shared::PipelineConfig;
use tracing::{debug, info};

use crate::bail;
use crate::error::{ErrorKind, GatewayResult};

/// Lifecycle state reported for a downstream pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Deploying,
    Starting,
    Running,
    Stopping,
    Deleted,
    Recovering,
    Failed,
    Resetting,
    Idle,
    Other(String),
}

impl PipelineState {
    pub fn parse(state: &str) -> Self {
        match state {
            "DEPLOYING" => PipelineState::Deploying,
            "STARTING" => PipelineState::Starting,
            "RUNNING" => PipelineState::Running,
            "STOPPING" => PipelineState::Stopping,
            "DELETED" => PipelineState::Deleted,
            "RECOVERING" => PipelineState::Recovering,
            "FAILED" => PipelineState::Failed,
            "RESETTING" => PipelineState::Resetting,
            "IDLE" => PipelineState::Idle,
            other => PipelineState::Other(other.to_string()),
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Deploying => "DEPLOYING",
            PipelineState::Starting => "STARTING",
            PipelineState::Running => "RUNNING",
            PipelineState::Stopping => "STOPPING",
            PipelineState::Deleted => "DELETED",
            PipelineState::Recovering => "RECOVERING",
            PipelineState::Failed => "FAILED",
            PipelineState::Resetting => "RESETTING",
            PipelineState::Idle => "IDLE",
            PipelineState::Other(other) => other,
        };
        f.write_str(name)
    }
}

/// Remote control of a downstream data pipeline.
#[async_trait::async_trait]
pub trait PipelineTrigger {
    fn name(&self) -> &'static str;

    /// Resolves the id of the pipeline named exactly `name`.
    async fn find_by_name(&self, name: &str) -> GatewayResult<String>;

    async fn state(&self, pipeline_id: &str) -> GatewayResult<PipelineState>;

    /// Starts a new update of the pipeline.
    async fn start(&self, pipeline_id: &str) -> GatewayResult<()>;
}

/// Which pipeline to run and how long to wait for each state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRun {
    pub pipeline_name: String,
    pub idle_timeout: Duration,
    pub running_timeout: Duration,
    pub poll_interval: Duration,
}

impl From<&PipelineConfig> for PipelineRun {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            pipeline_name: config.pipeline_name.clone(),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            running_timeout: Duration::from_secs(config.running_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

/// Waits for the pipeline to be idle, starts it, then waits until it runs.
///
/// Exceeding a wait budget fails with [`ErrorKind::PipelineTimeout`].
pub async fn run_pipeline(
    trigger: &(dyn PipelineTrigger + Send + Sync),
    run: &PipelineRun,
) -> GatewayResult<()> {
    let pipeline_id = trigger.find_by_name(&run.pipeline_name).await?;

    wait_for_state(
        trigger,
        &pipeline_id,
        PipelineState::Idle,
        run.idle_timeout,
        run.poll_interval,
    )
    .await?;
    trigger.start(&pipeline_id).await?;
    info!(pipeline = %run.pipeline_name, %pipeline_id, "pipeline update started");

    wait_for_state(
        trigger,
        &pipeline_id,
        PipelineState::Running,
        run.running_timeout,
        run.poll_interval,
    )
    .await
}

/// Polls the pipeline state until it equals `target`.
///
/// A pipeline reported as failed stops the wait immediately.
pub async fn wait_for_state(
    trigger: &(dyn PipelineTrigger + Send + Sync),
    pipeline_id: &str,
    target: PipelineState,
    timeout: Duration,
    poll_interval: Duration,
) -> GatewayResult<()> {
    let poll = poll_until(trigger, pipeline_id, &target, poll_interval);

    match tokio::time::timeout(timeout, poll).await {
        Ok(result) => result,
        Err(_) => bail!(
            ErrorKind::PipelineTimeout,
            "Timed out waiting for pipeline state",
            format!("pipeline `{pipeline_id}` did not reach {target} within {timeout:?}")
        ),
    }
}

async fn poll_until(
    trigger: &(dyn PipelineTrigger + Send + Sync),
    pipeline_id: &str,
    target: &PipelineState,
    poll_interval: Duration,
) -> GatewayResult<()> {
    loop {
        let state = trigger.state(pipeline_id).await?;
        debug!(%pipeline_id, %state, %target, "polled pipeline state");

        if &state == target {
            return Ok(());
        }
        if state == PipelineState::Failed {
            bail!(
                ErrorKind::PipelineTriggerFailed,
                "Pipeline is in a failed state",
                format!("pipeline `{pipeline_id}` while waiting for {target}")
            );
        }

        tokio::time::sleep(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct ScriptedTrigger {
        states: Mutex<VecDeque<PipelineState>>,
        last: Mutex<PipelineState>,
        starts: AtomicUsize,
    }

    impl ScriptedTrigger {
        fn new<I: IntoIterator<Item = PipelineState>>(states: I) -> Self {
            Self {
                states: Mutex::new(states.into_iter().collect()),
                last: Mutex::new(PipelineState::Idle),
                starts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl PipelineTrigger for ScriptedTrigger {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn find_by_name(&self, _name: &str) -> GatewayResult<String> {
            Ok("p-1".to_string())
        }

        async fn state(&self, _pipeline_id: &str) -> GatewayResult<PipelineState> {
            let mut last = self.last.lock().unwrap();
            if let Some(next) = self.states.lock().unwrap().pop_front() {
                *last = next;
            }
            Ok(last.clone())
        }

        async fn start(&self, _pipeline_id: &str) -> GatewayResult<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn run() -> PipelineRun {
        PipelineRun {
            pipeline_name: "labsync-dlt".to_string(),
            idle_timeout: Duration::from_secs(60),
            running_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(5),
        }
    }

    #[test]
    fn unknown_states_are_kept_verbatim() {
        assert_eq!(PipelineState::parse("IDLE"), PipelineState::Idle);

        let state = PipelineState::parse("WAITING_FOR_RESOURCES");
        assert_eq!(state.to_string(), "WAITING_FOR_RESOURCES");
    }

    #[tokio::test(start_paused = true)]
    async fn run_waits_for_idle_then_starts_and_waits_for_running() {
        let trigger = ScriptedTrigger::new([
            PipelineState::Stopping,
            PipelineState::Idle,
            PipelineState::Starting,
            PipelineState::Running,
        ]);

        run_pipeline(&trigger, &run()).await.unwrap();

        assert_eq!(trigger.starts.load(Ordering::SeqCst), 1);
        assert!(trigger.states.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_pipeline_stops_the_wait() {
        let trigger = ScriptedTrigger::new([PipelineState::Failed]);

        let err = run_pipeline(&trigger, &run()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PipelineTriggerFailed);
        assert_eq!(trigger.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pipeline_that_never_runs_times_out() {
        let trigger = ScriptedTrigger::new([PipelineState::Idle]);

        let err = run_pipeline(&trigger, &run()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PipelineTimeout);
        assert_eq!(trigger.starts.load(Ordering::SeqCst), 1);
    }
}
