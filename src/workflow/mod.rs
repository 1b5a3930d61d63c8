//! Workflow controllers.
//!
//! Each controller is a thin configuration of a [`BatchRunner`]:
//!
//! | Controller | Transform | Runs |
//! |---|---|---|
//! | [`SplitWorkflow`] | grid geometry + sampler, locally and atomically | one split, then tiles enhanced on demand |
//! | [`CropWorkflow`] | crop window from the item's pan at call time | whole queue, one item on retry |
//! | [`EnhanceWorkflow`] | [`Enhancer`](crate::services::Enhancer) | whole queue, one item on retry |
//! | [`SegmentWorkflow`] | [`BackgroundRemover`](crate::services::BackgroundRemover) | whole queue, one item on retry |
//!
//! Every controller owns its runner, so cancelling one never touches another.
//! Resetting an item to `Pending` (pan changed, ratio changed) is a
//! controller rule; the runner only ever moves items forward.

pub mod crop;
pub mod enhance;
pub mod segment;
pub mod split;

pub use crop::{CropWorkflow, Pan};
pub use enhance::{Enhance, EnhanceWorkflow};
pub use segment::{Segment, SegmentWorkflow};
pub use split::SplitWorkflow;

use crate::archive::ArchiveEntry;
use crate::batch::{
    AddOutcome, BatchError, BatchEvent, BatchRunner, ItemOutcome, RunOutcome, Transform,
    WithTimeout,
};
use crate::imaging::{GeometryError, Image, OperationError};
use crate::types::{ItemId, WorkItem, WorkStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("No source image loaded")]
    NoSource,
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error("Split failed: {0}")]
    Split(#[source] OperationError),
    #[error(transparent)]
    Operation(#[from] OperationError),
    #[error(transparent)]
    Batch(#[from] BatchError),
}

/// A runner plus id allocation for user-supplied images.
///
/// Ids are `{prefix}-{n}`, never reused within one queue, so an id removed
/// and re-added cannot collide with a late write from an older run.
pub struct ImageQueue {
    runner: BatchRunner,
    prefix: &'static str,
    next_id: AtomicU64,
}

impl ImageQueue {
    pub fn new(prefix: &'static str, limit: usize) -> Self {
        Self {
            runner: BatchRunner::new(limit),
            prefix,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_events(mut self, sender: Sender<BatchEvent>) -> Self {
        self.runner = self.runner.with_events(sender);
        self
    }

    fn allocate_id(&self) -> ItemId {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.prefix)
    }

    pub fn add(&self, name: impl Into<String>, image: Image) -> Result<ItemId, BatchError> {
        let id = self.allocate_id();
        self.runner.add(WorkItem::new(id.clone(), name, image))?;
        Ok(id)
    }

    /// Add images until the queue is full; the rest are reported as dropped.
    pub fn add_all(
        &self,
        images: impl IntoIterator<Item = (String, Image)>,
    ) -> Result<AddOutcome, BatchError> {
        let items: Vec<WorkItem> = images
            .into_iter()
            .map(|(name, image)| WorkItem::new(self.allocate_id(), name, image))
            .collect();
        self.runner.add_all(items)
    }

    pub fn remove(&self, id: &str) -> Result<Arc<WorkItem>, BatchError> {
        self.runner.remove(id)
    }

    pub fn clear(&self) {
        self.runner.clear();
    }

    pub fn cancel(&self) {
        self.runner.cancel();
    }

    pub fn get(&self, id: &str) -> Option<Arc<WorkItem>> {
        self.runner.get(id)
    }

    pub fn items(&self) -> Vec<Arc<WorkItem>> {
        self.runner.snapshot()
    }

    pub fn len(&self) -> usize {
        self.runner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runner.is_empty()
    }

    pub fn count(&self, status: WorkStatus) -> usize {
        self.runner.count(status)
    }

    pub fn remaining(&self) -> usize {
        self.runner.remaining()
    }

    pub fn runner(&self) -> &BatchRunner {
        &self.runner
    }

    /// Completed items as named archive entries.
    pub fn completed_entries(&self, name: impl Fn(&str) -> String) -> Vec<ArchiveEntry> {
        self.items()
            .iter()
            .filter(|item| item.status == WorkStatus::Completed)
            .filter_map(|item| {
                item.result.as_ref().map(|result| ArchiveEntry {
                    name: name(&item.name),
                    image: result.clone(),
                })
            })
            .collect()
    }
}

/// Fail with `Busy` when `id` is mid-run, `UnknownItem` when it is gone.
pub(crate) fn ensure_idle(runner: &BatchRunner, id: &str) -> Result<Arc<WorkItem>, BatchError> {
    let item = runner
        .get(id)
        .ok_or_else(|| BatchError::UnknownItem(id.to_string()))?;
    if item.status == WorkStatus::Processing {
        return Err(BatchError::Busy(id.to_string()));
    }
    Ok(item)
}

pub(crate) async fn run_all<T: Transform>(
    runner: &BatchRunner,
    transform: T,
    timeout: Option<Duration>,
    skip_if_completed: bool,
) -> RunOutcome {
    match timeout {
        Some(limit) => {
            runner
                .run_batch(&WithTimeout::new(transform, limit), skip_if_completed)
                .await
        }
        None => runner.run_batch(&transform, skip_if_completed).await,
    }
}

pub(crate) async fn run_single<T: Transform>(
    runner: &BatchRunner,
    id: &str,
    transform: T,
    timeout: Option<Duration>,
) -> Result<ItemOutcome, BatchError> {
    ensure_idle(runner, id)?;
    match timeout {
        Some(limit) => {
            runner
                .run_one(id, &WithTimeout::new(transform, limit))
                .await
        }
        None => runner.run_one(id, &transform).await,
    }
}
