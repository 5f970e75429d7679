//! Narrow interfaces to the external systems a delivery writes to.

mod notify;
mod object_store;
mod pipeline;
mod warehouse;

use std::sync::Arc;

pub use notify::Notifier;
pub use object_store::{
    JSON_CONTENT_TYPE, ObjectStore, clinical_key, encode_document, get_external_sample,
    get_request, get_sample, request_key, sample_key,
};
pub use pipeline::{PipelineRun, PipelineState, PipelineTrigger, run_pipeline, wait_for_state};
pub use warehouse::{RequestRow, SampleRow, Warehouse};

/// The set of sinks shared by every delivery task.
///
/// Only the object store is mandatory.
#[derive(Clone)]
pub struct Sinks {
    pub object_store: Arc<dyn ObjectStore + Send + Sync>,
    pub warehouse: Option<Arc<dyn Warehouse + Send + Sync>>,
    pub pipeline: Option<(Arc<dyn PipelineTrigger + Send + Sync>, PipelineRun)>,
    pub notifier: Option<Arc<dyn Notifier + Send + Sync>>,
}

impl Sinks {
    pub fn new(object_store: Arc<dyn ObjectStore + Send + Sync>) -> Self {
        Self {
            object_store,
            warehouse: None,
            pipeline: None,
            notifier: None,
        }
    }

    pub fn with_warehouse(mut self, warehouse: Arc<dyn Warehouse + Send + Sync>) -> Self {
        self.warehouse = Some(warehouse);
        self
    }

    pub fn with_pipeline(
        mut self,
        trigger: Arc<dyn PipelineTrigger + Send + Sync>,
        run: PipelineRun,
    ) -> Self {
        self.pipeline = Some((trigger, run));
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier + Send + Sync>) -> Self {
        self.notifier = Some(notifier);
        self
    }
}

impl std::fmt::Debug for Sinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sinks")
            .field("object_store", &self.object_store.name())
            .field("warehouse", &self.warehouse.as_ref().map(|w| w.name()))
            .field("pipeline", &self.pipeline.as_ref().map(|(t, _)| t.name()))
            .field("notifier", &self.notifier.as_ref().map(|n| n.name()))
            .finish()
    }
}
