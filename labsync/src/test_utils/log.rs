use std::fmt;
use std::sync::Arc;

use tokio::sync::{Notify, RwLock};

use crate::test_utils::notify::TimedNotify;

/// Something a test double observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Put { bucket: String, key: String },
    /// A put failed on a key registered with
    /// [`super::sinks::MemoryObjectStore::fail_on_key`].
    PutFailed { key: String },
    /// A put is waiting for [`super::sinks::MemoryObjectStore::resume`].
    PutHeld { key: String },
    Delete { bucket: String, key: String },
    UpsertRequest { request_id: String },
    UpsertSamples { count: usize },
    PipelineStarted { pipeline_id: String },
    Acked { sequence: u64 },
    Notified { text: String },
    BrokerShutdown,
}

type Condition = Box<dyn Fn(&[Recorded]) -> bool + Send + Sync>;

#[derive(Default)]
struct Inner {
    events: Vec<Recorded>,
    conditions: Vec<(Condition, Arc<Notify>)>,
}

impl Inner {
    fn check_conditions(&mut self) {
        let events = &self.events;
        self.conditions.retain(|(condition, notify)| {
            let met = condition(events);
            if met {
                notify.notify_one();
            }
            !met
        });
    }
}

/// Ordered journal shared by the test doubles of one test.
#[derive(Clone, Default)]
pub struct EventLog {
    inner: Arc<RwLock<Inner>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, event: Recorded) {
        let mut inner = self.inner.write().await;
        inner.events.push(event);
        inner.check_conditions();
    }

    pub async fn events(&self) -> Vec<Recorded> {
        self.inner.read().await.events.clone()
    }

    pub async fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Recorded) -> bool,
    {
        self.inner
            .read()
            .await
            .events
            .iter()
            .filter(|event| predicate(event))
            .count()
    }

    pub async fn acks(&self, sequence: u64) -> usize {
        self.count(|event| *event == Recorded::Acked { sequence })
            .await
    }

    pub async fn notifications(&self) -> Vec<String> {
        self.inner
            .read()
            .await
            .events
            .iter()
            .filter_map(|event| match event {
                Recorded::Notified { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns a notification fired once `condition` holds for the recorded events.
    pub async fn notify_on<F>(&self, condition: F) -> TimedNotify
    where
        F: Fn(&[Recorded]) -> bool + Send + Sync + 'static,
    {
        let notify = Arc::new(Notify::new());
        let mut inner = self.inner.write().await;
        inner.conditions.push((Box::new(condition), notify.clone()));
        inner.check_conditions();

        TimedNotify::new(notify)
    }

    /// Fires once any recorded event satisfies `predicate`.
    pub async fn notify_on_event<F>(&self, predicate: F) -> TimedNotify
    where
        F: Fn(&Recorded) -> bool + Send + Sync + 'static,
    {
        self.notify_on(move |events| events.iter().any(&predicate))
            .await
    }

    /// Fires once the message published with `sequence` was acknowledged.
    pub async fn notify_on_ack(&self, sequence: u64) -> TimedNotify {
        self.notify_on(move |events| events.contains(&Recorded::Acked { sequence }))
            .await
    }
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.inner.try_read().map(|inner| inner.events.len()).ok();
        f.debug_struct("EventLog").field("events", &len).finish()
    }
}
