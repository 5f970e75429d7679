//! Lifecycle of the time-boxed object store client.
//!
//! A client is built lazily on first use. Once its session is older than the configured maximum
//! it is discarded, the external credential refresh command runs, and a new client is built after
//! a settle interval that lets the refreshed credentials propagate.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use labsync_config::shared::SessionConfig;
use tokio::process::Command;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{ErrorKind, GatewayResult};
use crate::{bail, gateway_error};

/// Re-authenticates against the object store provider.
#[async_trait::async_trait]
pub trait CredentialRefresher {
    async fn refresh(&self) -> GatewayResult<()>;
}

/// Builds object store clients from the refreshed credentials.
#[async_trait::async_trait]
pub trait ClientFactory {
    type Client: Clone + Send + Sync + 'static;

    async fn build(&self) -> GatewayResult<Self::Client>;
}

/// Runs an executable script with `sh`, succeeding on a zero exit code. Output is not parsed.
#[derive(Debug, Clone)]
pub struct CommandCredentialRefresher {
    command: PathBuf,
}

impl CommandCredentialRefresher {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait::async_trait]
impl CredentialRefresher for CommandCredentialRefresher {
    async fn refresh(&self) -> GatewayResult<()> {
        info!(command = %self.command.display(), "refreshing object store credentials");

        let status = Command::new("sh")
            .arg(&self.command)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|err| {
                gateway_error!(
                    ErrorKind::CredentialRefreshFailed,
                    "Could not run the credential refresh command",
                    format!("{}: {err}", self.command.display()),
                    source: err
                )
            })?;

        if !status.success() {
            bail!(
                ErrorKind::CredentialRefreshFailed,
                "Credential refresh command failed",
                format!("{} exited with {status}", self.command.display())
            );
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub max_duration: Duration,
    pub settle_interval: Duration,
}

impl TryFrom<&SessionConfig> for SessionSettings {
    type Error = crate::error::GatewayError;

    fn try_from(config: &SessionConfig) -> GatewayResult<Self> {
        let max_duration = Duration::try_from_secs_f64(config.max_duration_secs).map_err(|err| {
            gateway_error!(
                ErrorKind::ConfigError,
                "Invalid session duration",
                format!("{}: {err}", config.max_duration_secs)
            )
        })?;

        Ok(Self {
            max_duration,
            settle_interval: Duration::from_millis(config.settle_interval_ms),
        })
    }
}

#[derive(Debug)]
struct Session<C> {
    started_at: Instant,
    client: C,
}

/// Hands out the current client, renewing its session when it expired.
///
/// The slot is locked only to read or to swap the session, never while refreshing or building.
/// Two tasks observing expiry at the same time both refresh, and the last built session wins the
/// slot. A client already handed out stays usable by the task holding it.
pub struct SessionManager<F: ClientFactory> {
    refresher: Arc<dyn CredentialRefresher + Send + Sync>,
    factory: F,
    settings: SessionSettings,
    slot: RwLock<Option<Session<F::Client>>>,
}

impl<F: ClientFactory> SessionManager<F> {
    pub fn new(
        refresher: Arc<dyn CredentialRefresher + Send + Sync>,
        factory: F,
        settings: SessionSettings,
    ) -> Self {
        Self {
            refresher,
            factory,
            settings,
            slot: RwLock::new(None),
        }
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    /// Returns the live client, or renews the session first.
    ///
    /// On failure no session is stored, so the next call refreshes again.
    pub async fn acquire_client(&self) -> GatewayResult<F::Client> {
        if let Some(client) = self.live_client().await {
            return Ok(client);
        }

        {
            let mut slot = self.slot.write().await;
            if let Some(session) = slot.as_ref() {
                if !self.is_expired(session) {
                    return Ok(session.client.clone());
                }
                debug!(
                    age_secs = session.started_at.elapsed().as_secs_f64(),
                    "object store session expired"
                );
            }
            *slot = None;
        }

        self.refresher.refresh().await?;
        tokio::time::sleep(self.settings.settle_interval).await;
        let client = self.factory.build().await?;

        *self.slot.write().await = Some(Session {
            started_at: Instant::now(),
            client: client.clone(),
        });
        info!("object store session started");

        Ok(client)
    }

    /// Returns `true` when a session exists and has not expired.
    pub async fn has_live_session(&self) -> bool {
        self.live_client().await.is_some()
    }

    async fn live_client(&self) -> Option<F::Client> {
        let slot = self.slot.read().await;
        slot.as_ref()
            .filter(|session| !self.is_expired(session))
            .map(|session| session.client.clone())
    }

    fn is_expired(&self, session: &Session<F::Client>) -> bool {
        session.started_at.elapsed() >= self.settings.max_duration
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingRefresher {
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait::async_trait]
    impl CredentialRefresher for CountingRefresher {
        async fn refresh(&self) -> GatewayResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                bail!(ErrorKind::CredentialRefreshFailed, "Refresh failed");
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct SequenceFactory {
        built: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ClientFactory for SequenceFactory {
        type Client = usize;

        async fn build(&self) -> GatewayResult<usize> {
            Ok(self.built.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    fn manager(
        max_duration: Duration,
    ) -> (Arc<CountingRefresher>, SessionManager<SequenceFactory>) {
        let refresher = Arc::new(CountingRefresher::default());
        let manager = SessionManager::new(
            refresher.clone(),
            SequenceFactory::default(),
            SessionSettings {
                max_duration,
                settle_interval: Duration::from_secs(60),
            },
        );
        (refresher, manager)
    }

    #[tokio::test(start_paused = true)]
    async fn first_call_refreshes_then_settles() {
        let (refresher, manager) = manager(Duration::from_secs(1));
        let started = Instant::now();

        let client = manager.acquire_client().await.unwrap();

        assert_eq!(client, 1);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn live_session_is_reused() {
        let (refresher, manager) = manager(Duration::from_secs(1));

        let first = manager.acquire_client().await.unwrap();
        let second = manager.acquire_client().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_session_is_renewed() {
        let (refresher, manager) = manager(Duration::from_secs(1));

        let first = manager.acquire_client().await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        let second = manager.acquire_client().await.unwrap();

        assert_ne!(first, second);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_discards_expired_session() {
        let (refresher, manager) = manager(Duration::from_secs(1));

        manager.acquire_client().await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        refresher.fail.store(true, Ordering::SeqCst);

        let err = manager.acquire_client().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CredentialRefreshFailed);
        assert!(!manager.has_live_session().await);

        refresher.fail.store(false, Ordering::SeqCst);
        assert_eq!(manager.acquire_client().await.unwrap(), 2);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn settings_reject_negative_duration() {
        let config = SessionConfig {
            credential_refresh_command: "refresh.sh".to_string(),
            profile: "default".to_string(),
            region: "us-east-1".to_string(),
            max_duration_secs: -1.0,
            settle_interval_ms: 10,
        };

        let err = SessionSettings::try_from(&config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }

    #[tokio::test]
    async fn command_refresher_reports_exit_status() {
        let script = std::env::temp_dir().join(format!("labsync-refresh-{}.sh", std::process::id()));
        std::fs::write(&script, "exit 3\n").unwrap();

        let err = CommandCredentialRefresher::new(&script)
            .refresh()
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CredentialRefreshFailed);
        let _ = std::fs::remove_file(script);
    }
}
