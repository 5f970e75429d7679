use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, RwLock, watch};

use crate::bail;
use crate::error::{ErrorKind, GatewayResult};
use crate::sinks::{
    Notifier, ObjectStore, PipelineState, PipelineTrigger, RequestRow, SampleRow, Warehouse,
};
use crate::test_utils::log::{EventLog, Recorded};

#[derive(Default)]
struct ObjectStoreInner {
    objects: HashMap<(String, String), Bytes>,
    failing_keys: HashSet<String>,
    put_attempts: usize,
}

/// Object store keeping documents in memory.
///
/// Puts to a key registered with [`MemoryObjectStore::fail_on_key`] fail with
/// [`ErrorKind::ObjectStoreWriteFailed`].
///
/// While paused with [`MemoryObjectStore::pause`], puts record [`Recorded::PutHeld`] and wait
/// until [`MemoryObjectStore::resume`] is called.
#[derive(Clone)]
pub struct MemoryObjectStore {
    inner: Arc<RwLock<ObjectStoreInner>>,
    paused: Arc<watch::Sender<bool>>,
    log: EventLog,
}

impl MemoryObjectStore {
    pub fn new(log: EventLog) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            inner: Arc::default(),
            paused: Arc::new(paused),
            log,
        }
    }

    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub async fn fail_on_key(&self, key: impl Into<String>) {
        self.inner.write().await.failing_keys.insert(key.into());
    }

    pub async fn clear_failures(&self) {
        self.inner.write().await.failing_keys.clear();
    }

    pub async fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.inner
            .read()
            .await
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys = self
            .inner
            .read()
            .await
            .objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, key)| key.clone())
            .collect::<Vec<_>>();
        keys.sort();
        keys
    }

    /// Number of puts attempted, failed ones included.
    pub async fn put_attempts(&self) -> usize {
        self.inner.read().await.put_attempts
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        _content_type: &str,
        body: Bytes,
    ) -> GatewayResult<()> {
        let mut paused = self.paused.subscribe();
        if *paused.borrow() {
            self.log
                .record(Recorded::PutHeld {
                    key: key.to_string(),
                })
                .await;
            let _ = paused.wait_for(|paused| !*paused).await;
        }

        let injected = {
            let mut inner = self.inner.write().await;
            inner.put_attempts += 1;
            let injected = inner.failing_keys.contains(key);
            if !injected {
                inner
                    .objects
                    .insert((bucket.to_string(), key.to_string()), body);
            }
            injected
        };

        if injected {
            self.log
                .record(Recorded::PutFailed {
                    key: key.to_string(),
                })
                .await;
            bail!(
                ErrorKind::ObjectStoreWriteFailed,
                "Injected object store failure",
                format!("{bucket}/{key}")
            );
        }

        self.log
            .record(Recorded::Put {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
            .await;
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> GatewayResult<Bytes> {
        match self.object(bucket, key).await {
            Some(body) => Ok(body),
            None => bail!(
                ErrorKind::ObjectStoreReadFailed,
                "Object not found",
                format!("{bucket}/{key}")
            ),
        }
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> GatewayResult<()> {
        self.inner
            .write()
            .await
            .objects
            .remove(&(bucket.to_string(), key.to_string()));
        self.log
            .record(Recorded::Delete {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
            .await;
        Ok(())
    }
}

#[derive(Default)]
struct WarehouseInner {
    requests: HashMap<String, RequestRow>,
    samples: HashMap<(String, String), SampleRow>,
    reported_rows: Option<u64>,
}

/// Warehouse with upsert semantics over two in-memory tables.
///
/// Like a single `insert ... on conflict do update` statement, a sample batch naming the same key
/// twice fails with [`ErrorKind::WarehouseQueryFailed`] and writes nothing.
#[derive(Clone)]
pub struct MemoryWarehouse {
    inner: Arc<RwLock<WarehouseInner>>,
    log: EventLog,
}

impl MemoryWarehouse {
    pub fn new(log: EventLog) -> Self {
        Self {
            inner: Arc::default(),
            log,
        }
    }

    /// Makes every write report `rows` affected rows, whatever was written.
    pub async fn report_rows(&self, rows: u64) {
        self.inner.write().await.reported_rows = Some(rows);
    }

    pub async fn sample_count(&self) -> usize {
        self.inner.read().await.samples.len()
    }
}

#[async_trait::async_trait]
impl Warehouse for MemoryWarehouse {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn upsert_request(&self, row: &RequestRow) -> GatewayResult<u64> {
        let reported = {
            let mut inner = self.inner.write().await;
            inner.requests.insert(row.request_id.clone(), row.clone());
            inner.reported_rows.unwrap_or(1)
        };

        self.log
            .record(Recorded::UpsertRequest {
                request_id: row.request_id.clone(),
            })
            .await;
        Ok(reported)
    }

    async fn upsert_samples(&self, rows: &[SampleRow]) -> GatewayResult<u64> {
        let mut keys = HashSet::with_capacity(rows.len());
        if let Some(row) = rows
            .iter()
            .find(|row| !keys.insert((row.request_id.as_str(), row.sample_name.as_str())))
        {
            bail!(
                ErrorKind::WarehouseQueryFailed,
                "Could not upsert sample rows",
                format!(
                    "row ({}, {}) affected twice in one statement",
                    row.request_id, row.sample_name
                )
            );
        }

        let reported = {
            let mut inner = self.inner.write().await;
            for row in rows {
                inner.samples.insert(
                    (row.request_id.clone(), row.sample_name.clone()),
                    row.clone(),
                );
            }
            inner.reported_rows.unwrap_or(rows.len() as u64)
        };

        self.log
            .record(Recorded::UpsertSamples { count: rows.len() })
            .await;
        Ok(reported)
    }

    async fn get_request(&self, request_id: &str) -> GatewayResult<Option<RequestRow>> {
        Ok(self.inner.read().await.requests.get(request_id).cloned())
    }

    async fn get_sample(
        &self,
        request_id: &str,
        sample_name: &str,
    ) -> GatewayResult<Option<SampleRow>> {
        Ok(self
            .inner
            .read()
            .await
            .samples
            .get(&(request_id.to_string(), sample_name.to_string()))
            .cloned())
    }

    async fn delete_request(&self, request_id: &str) -> GatewayResult<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.samples.len();
        inner.samples.retain(|(id, _), _| id != request_id);
        let removed_samples = (before - inner.samples.len()) as u64;
        let removed_request = u64::from(inner.requests.remove(request_id).is_some());

        Ok(removed_request + removed_samples)
    }
}

/// Notifier storing posted texts in the event log.
#[derive(Clone)]
pub struct RecordingNotifier {
    log: EventLog,
    fail: Arc<Mutex<bool>>,
}

impl RecordingNotifier {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            fail: Arc::default(),
        }
    }

    /// Makes every later post fail after being recorded.
    pub async fn fail(&self) {
        *self.fail.lock().await = true;
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn notify(&self, text: &str) -> GatewayResult<()> {
        self.log
            .record(Recorded::Notified {
                text: text.to_string(),
            })
            .await;

        if *self.fail.lock().await {
            bail!(ErrorKind::NotificationFailed, "Injected notification failure");
        }
        Ok(())
    }
}

struct PipelineInner {
    pipelines: HashMap<String, String>,
    states: VecDeque<PipelineState>,
    current: PipelineState,
}

/// Pipeline trigger replaying a scripted sequence of states.
///
/// Each state poll consumes the next scripted state. Once the script is exhausted the last state
/// is reported forever.
#[derive(Clone)]
pub struct RecordingPipelineTrigger {
    inner: Arc<Mutex<PipelineInner>>,
    log: EventLog,
}

impl RecordingPipelineTrigger {
    pub fn new(log: EventLog, name: &str, pipeline_id: &str) -> Self {
        let inner = PipelineInner {
            pipelines: HashMap::from([(name.to_string(), pipeline_id.to_string())]),
            states: VecDeque::new(),
            current: PipelineState::Idle,
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
            log,
        }
    }

    pub async fn script<I>(&self, states: I)
    where
        I: IntoIterator<Item = PipelineState>,
    {
        self.inner.lock().await.states.extend(states);
    }
}

#[async_trait::async_trait]
impl PipelineTrigger for RecordingPipelineTrigger {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn find_by_name(&self, name: &str) -> GatewayResult<String> {
        match self.inner.lock().await.pipelines.get(name) {
            Some(id) => Ok(id.clone()),
            None => bail!(
                ErrorKind::PipelineNotFound,
                "Pipeline not found",
                format!("name `{name}`")
            ),
        }
    }

    async fn state(&self, _pipeline_id: &str) -> GatewayResult<PipelineState> {
        let mut inner = self.inner.lock().await;
        if let Some(next) = inner.states.pop_front() {
            inner.current = next;
        }
        Ok(inner.current.clone())
    }

    async fn start(&self, pipeline_id: &str) -> GatewayResult<()> {
        self.log
            .record(Recorded::PipelineStarted {
                pipeline_id: pipeline_id.to_string(),
            })
            .await;
        Ok(())
    }
}
