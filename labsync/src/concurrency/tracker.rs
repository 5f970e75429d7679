use std::future::Future;

use tokio_util::task::TaskTracker;
use tracing::error;

use crate::error::ErrorKind;
use crate::gateway_error;
use crate::types::MessageFamily;

/// Counts the delivery tasks in flight for one message family.
#[derive(Debug, Clone)]
pub struct CompletionTracker {
    family: MessageFamily,
    tasks: TaskTracker,
}

impl CompletionTracker {
    pub fn new(family: MessageFamily) -> Self {
        Self {
            family,
            tasks: TaskTracker::new(),
        }
    }

    pub fn family(&self) -> MessageFamily {
        self.family
    }

    /// Spawns `job` and registers it until it finishes.
    ///
    /// A panicking job is logged and counted as finished, it never takes the loop down.
    pub fn spawn<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let family = self.family;
        self.tasks.spawn(async move {
            if let Err(err) = tokio::spawn(job).await
                && err.is_panic()
            {
                let err = gateway_error!(
                    ErrorKind::DeliveryTaskPanic,
                    "Delivery task panicked",
                    format!("family `{family}`")
                );
                error!(%family, error = %err, "delivery task panicked");
            }
        });
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Marks the tracker as draining. [`CompletionTracker::wait`] only returns once the tracker
    /// is closed and empty.
    pub fn close(&self) {
        self.tasks.close();
    }

    pub async fn wait(&self) {
        self.tasks.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn wait_returns_after_all_jobs() {
        let tracker = CompletionTracker::new(MessageFamily::UpdatedSample);
        let done = Arc::new(AtomicUsize::new(0));

        for delay in [30, 10, 20] {
            let done = done.clone();
            tracker.spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(tracker.in_flight(), 3);

        tracker.close();
        tracker.wait().await;

        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[tokio::test]
    async fn panicking_job_still_completes() {
        let tracker = CompletionTracker::new(MessageFamily::NewRequest);

        tracker.spawn(async { panic!("boom") });

        tracker.close();
        tracker.wait().await;
        assert_eq!(tracker.in_flight(), 0);
    }
}
