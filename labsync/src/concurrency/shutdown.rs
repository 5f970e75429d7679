use std::sync::Arc;

use tokio::sync::watch;

/// Receiver side of the shutdown signal.
///
/// A shutdown is observed as a change of the channel value.
pub type ShutdownRx = watch::Receiver<()>;

/// Sender side of the shutdown signal, cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownTx(Arc<watch::Sender<()>>);

impl ShutdownTx {
    /// Signals every subscribed receiver.
    pub fn shutdown(&self) {
        self.0.send_replace(());
    }

    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Creates a shutdown channel whose receiver has not observed any signal yet.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx(Arc::new(tx)), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_observe_shutdown() {
        let (tx, mut rx) = create_shutdown_channel();
        let mut late = tx.subscribe();

        tx.clone().shutdown();

        assert!(rx.changed().await.is_ok());
        assert!(late.changed().await.is_ok());
    }
}
