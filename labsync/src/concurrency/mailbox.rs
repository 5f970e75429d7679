use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;

use crate::concurrency::CompletionTracker;
use crate::error::{ErrorKind, GatewayResult};
use crate::gateway_error;
use crate::types::MessageFamily;

/// Number of undelivered messages a family may buffer ahead of the broker.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 1;

/// Creates a mailbox holding at most [`DEFAULT_MAILBOX_CAPACITY`] items.
pub fn mailbox<T>(family: MessageFamily) -> (MailboxSender<T>, Mailbox<T>) {
    mailbox_with_capacity(family, DEFAULT_MAILBOX_CAPACITY)
}

pub fn mailbox_with_capacity<T>(
    family: MessageFamily,
    capacity: usize,
) -> (MailboxSender<T>, Mailbox<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        MailboxSender { family, tx },
        Mailbox { family, rx },
    )
}

/// Sending half of a family mailbox, owned by the router.
#[derive(Debug)]
pub struct MailboxSender<T> {
    family: MessageFamily,
    tx: mpsc::Sender<T>,
}

impl<T> Clone for MailboxSender<T> {
    fn clone(&self) -> Self {
        Self {
            family: self.family,
            tx: self.tx.clone(),
        }
    }
}

impl<T> MailboxSender<T> {
    pub fn family(&self) -> MessageFamily {
        self.family
    }

    /// Waits for a free slot, then enqueues `item`.
    ///
    /// Fails with [`ErrorKind::QueueClosed`] once the dispatch loop stopped draining the mailbox,
    /// the item is dropped in that case.
    pub async fn send(&self, item: T) -> GatewayResult<()> {
        self.tx.send(item).await.map_err(|_| {
            gateway_error!(
                ErrorKind::QueueClosed,
                "Mailbox is closed",
                format!("family `{}`", self.family)
            )
        })
    }
}

/// Receiving half of a family mailbox.
#[derive(Debug)]
pub struct Mailbox<T> {
    family: MessageFamily,
    rx: mpsc::Receiver<T>,
}

impl<T> Mailbox<T>
where
    T: Send + 'static,
{
    pub fn family(&self) -> MessageFamily {
        self.family
    }

    /// Takes the next item, or `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Turns the mailbox into a [`Lane`] producing one job per item, in FIFO order.
    pub fn into_lane<F, Fut>(self, handler: F) -> Lane
    where
        F: Fn(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let family = self.family;
        let tracker = CompletionTracker::new(family);
        let items = stream::unfold(self.rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        let lane_tracker = tracker.clone();
        let dispatches = items
            .map(move |item| Dispatch {
                tracker: lane_tracker.clone(),
                job: handler(item).boxed(),
            })
            .boxed();

        Lane {
            family,
            tracker,
            dispatches,
        }
    }
}

/// A unit of work taken from a mailbox, not started yet.
pub struct Dispatch {
    tracker: CompletionTracker,
    job: BoxFuture<'static, ()>,
}

impl Dispatch {
    pub fn family(&self) -> MessageFamily {
        self.tracker.family()
    }

    /// Spawns the job on its family tracker without waiting for it.
    pub fn spawn(self) {
        self.tracker.spawn(self.job);
    }
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("family", &self.family())
            .finish_non_exhaustive()
    }
}

/// The stream of jobs of one family together with its completion tracker.
pub struct Lane {
    family: MessageFamily,
    tracker: CompletionTracker,
    dispatches: BoxStream<'static, Dispatch>,
}

impl Lane {
    pub fn family(&self) -> MessageFamily {
        self.family
    }

    pub fn into_parts(self) -> (CompletionTracker, BoxStream<'static, Dispatch>) {
        (self.tracker, self.dispatches)
    }
}

impl fmt::Debug for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lane")
            .field("family", &self.family)
            .field("in_flight", &self.tracker.in_flight())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn send_waits_for_a_free_slot() {
        let (tx, _mailbox) = mailbox::<u32>(MessageFamily::UpdatedRequest);

        tx.send(1).await.unwrap();
        let blocked = tokio::time::timeout(Duration::from_secs(1), tx.send(2)).await;

        assert!(blocked.is_err());
    }

    #[tokio::test]
    async fn send_fails_once_mailbox_is_dropped() {
        let (tx, mailbox) = mailbox::<u32>(MessageFamily::NewRequest);
        drop(mailbox);

        let err = tx.send(1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QueueClosed);
    }

    #[tokio::test]
    async fn lane_yields_jobs_in_order() {
        let (tx, mailbox) = mailbox_with_capacity::<u32>(MessageFamily::UpdatedSample, 3);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let handler_seen = seen.clone();
        let lane = mailbox.into_lane(move |item| {
            let seen = handler_seen.clone();
            async move { seen.lock().unwrap().push(item) }
        });
        for item in [1, 2, 3] {
            tx.send(item).await.unwrap();
        }
        drop(tx);

        let (tracker, mut dispatches) = lane.into_parts();
        while let Some(dispatch) = dispatches.next().await {
            assert_eq!(dispatch.family(), MessageFamily::UpdatedSample);
            dispatch.job.await;
        }
        tracker.close();
        tracker.wait().await;

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }
}
