//! Sequential, cancellable batch runner.
//!
//! Every batch workflow (crop, enhance, background removal, on-demand tile
//! enhancement) drives its items through the same runner:
//!
//! ```text
//! Pending → Processing → Completed
//!                      ↘ Failed
//! ```
//!
//! ## Processing model
//!
//! [`BatchRunner::run_batch`] snapshots the batch, then awaits one
//! [`Transform`] call at a time in snapshot order. Nothing runs in parallel:
//! peak memory stays at one extra image and the remote services see one
//! request at a time. Items added after the snapshot wait for the next run.
//!
//! A failing item is marked `Failed` and the loop moves on; one bad image
//! never blocks the rest of the batch.
//!
//! ## Cancellation
//!
//! Each runner owns an epoch counter. [`BatchRunner::cancel`] and
//! [`BatchRunner::clear`] bump it. A run captures the epoch when it starts
//! and re-checks it before every write; once it differs the run stops without
//! touching anything else. An in-flight transform is not aborted (it is an
//! opaque future) but its result is dropped. Items left `Processing` by a
//! cancelled run are picked up again by the next `run_batch`.
//!
//! Epochs are per runner, so independent workflows cancel independently.
//!
//! ## Observers
//!
//! Status changes are published as [`BatchEvent`]s on an optional channel.
//! Items are stored as `Arc<WorkItem>` and replaced on every change, so a
//! snapshot handed to a reader never changes underneath it.

use crate::imaging::{Image, OperationError};
use crate::services::ServiceError;
use crate::types::{ItemId, WorkItem, WorkStatus};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Default per-batch item cap.
pub const DEFAULT_MAX_ITEMS: usize = 20;

/// Why a single item's transform failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error(transparent)]
    Operation(#[from] OperationError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("Transform timed out after {0:?}")]
    Timeout(Duration),
}

impl TransformError {
    /// Message shown next to a failed item, with remediation when there is one.
    pub fn user_message(&self) -> String {
        match self {
            TransformError::Service(e) => match e.remediation() {
                Some(hint) => format!("{e} ({hint})"),
                None => e.to_string(),
            },
            other => other.to_string(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error("Batch is full ({limit} items)")]
    Full { limit: usize },
    #[error("Duplicate item id: {0}")]
    DuplicateId(ItemId),
    #[error("Unknown item: {0}")]
    UnknownItem(ItemId),
    #[error("Item is being processed: {0}")]
    Busy(ItemId),
}

/// Per-item async operation applied by the runner.
pub trait Transform {
    fn apply(
        &self,
        id: &str,
        source: &Image,
    ) -> impl Future<Output = Result<Image, TransformError>>;
}

/// Adapts a synchronous function into a [`Transform`].
///
/// Used for local work (crop, resample) that never suspends.
pub struct SyncTransform<F>(pub F);

impl<F> Transform for SyncTransform<F>
where
    F: Fn(&str, &Image) -> Result<Image, TransformError>,
{
    async fn apply(&self, id: &str, source: &Image) -> Result<Image, TransformError> {
        (self.0)(id, source)
    }
}

/// Bounds every call of the inner transform to `timeout`.
///
/// A timed-out call counts as a failure of that item; the runner's own
/// contract is unchanged.
pub struct WithTimeout<T> {
    inner: T,
    timeout: Duration,
}

impl<T> WithTimeout<T> {
    pub fn new(inner: T, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl<T: Transform> Transform for WithTimeout<T> {
    async fn apply(&self, id: &str, source: &Image) -> Result<Image, TransformError> {
        tokio::time::timeout(self.timeout, self.inner.apply(id, source))
            .await
            .map_err(|_| TransformError::Timeout(self.timeout))?
    }
}

/// Ordered collection of work items keyed by id.
#[derive(Debug, Clone)]
pub struct Batch {
    items: Vec<Arc<WorkItem>>,
    limit: usize,
}

/// How many items an [`Batch::extend`] call took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddOutcome {
    pub accepted: usize,
    /// Items turned away because the batch was full.
    pub dropped: usize,
}

impl Batch {
    pub fn new(limit: usize) -> Self {
        Self {
            items: Vec::new(),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.items.len())
    }

    pub fn push(&mut self, item: WorkItem) -> Result<(), BatchError> {
        if self.items.len() >= self.limit {
            return Err(BatchError::Full { limit: self.limit });
        }
        if self.position(&item.id).is_some() {
            return Err(BatchError::DuplicateId(item.id));
        }
        self.items.push(Arc::new(item));
        Ok(())
    }

    /// Add items until the batch is full; the rest are dropped.
    ///
    /// Duplicate ids are an error and stop the extend at that item.
    pub fn extend(
        &mut self,
        items: impl IntoIterator<Item = WorkItem>,
    ) -> Result<AddOutcome, BatchError> {
        let mut outcome = AddOutcome::default();
        for item in items {
            if self.remaining() == 0 {
                outcome.dropped += 1;
                continue;
            }
            self.push(item)?;
            outcome.accepted += 1;
        }
        Ok(outcome)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|it| it.id == id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<WorkItem>> {
        self.position(id).map(|i| Arc::clone(&self.items[i]))
    }

    pub fn remove(&mut self, id: &str) -> Option<Arc<WorkItem>> {
        self.position(id).map(|i| self.items.remove(i))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Swap in a new value for an existing id. Returns false if the id is gone.
    pub fn replace(&mut self, item: WorkItem) -> bool {
        match self.position(&item.id) {
            Some(i) => {
                self.items[i] = Arc::new(item);
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> Vec<Arc<WorkItem>> {
        self.items.clone()
    }

    pub fn count(&self, status: WorkStatus) -> usize {
        self.items.iter().filter(|it| it.status == status).count()
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITEMS)
    }
}

/// Counts for one finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
    /// Already-completed items passed over by `skip_if_completed`.
    pub skipped: usize,
}

/// Events published while a batch is processed.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    RunStarted { items: usize },
    StatusChanged { id: ItemId, status: WorkStatus },
    ItemFailed { id: ItemId, message: String },
    RunFinished(RunSummary),
    RunCancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Finished(RunSummary),
    /// The epoch moved during the run; nothing was reported as finished.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Completed,
    Failed,
    Cancelled,
}

enum Commit {
    Applied,
    Stale,
    Missing,
}

/// Drives a [`Batch`] through a [`Transform`], one item at a time.
pub struct BatchRunner {
    batch: Mutex<Batch>,
    epoch: AtomicU64,
    events: Option<Sender<BatchEvent>>,
}

impl BatchRunner {
    pub fn new(limit: usize) -> Self {
        Self {
            batch: Mutex::new(Batch::new(limit)),
            epoch: AtomicU64::new(0),
            events: None,
        }
    }

    /// Publish events to `sender`. Send failures are ignored.
    pub fn with_events(mut self, sender: Sender<BatchEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Batch> {
        self.batch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: BatchEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Invalidate every run in flight. Items keep their current status.
    pub fn cancel(&self) {
        let _batch = self.lock();
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Remove every item and invalidate every run in flight.
    pub fn clear(&self) {
        let mut batch = self.lock();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        batch.clear();
    }

    pub fn add(&self, item: WorkItem) -> Result<(), BatchError> {
        self.lock().push(item)
    }

    pub fn add_all(
        &self,
        items: impl IntoIterator<Item = WorkItem>,
    ) -> Result<AddOutcome, BatchError> {
        self.lock().extend(items)
    }

    pub fn remove(&self, id: &str) -> Result<Arc<WorkItem>, BatchError> {
        self.lock()
            .remove(id)
            .ok_or_else(|| BatchError::UnknownItem(id.to_string()))
    }

    pub fn get(&self, id: &str) -> Option<Arc<WorkItem>> {
        self.lock().get(id)
    }

    pub fn snapshot(&self) -> Vec<Arc<WorkItem>> {
        self.lock().snapshot()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn count(&self, status: WorkStatus) -> usize {
        self.lock().count(status)
    }

    pub fn remaining(&self) -> usize {
        self.lock().remaining()
    }

    /// Replace an item outside of any run (workflow-level resets).
    ///
    /// The runner itself never moves an item backward; workflows do it
    /// through this method when upstream parameters change.
    pub fn update(
        &self,
        id: &str,
        f: impl FnOnce(&WorkItem) -> Result<WorkItem, BatchError>,
    ) -> Result<Arc<WorkItem>, BatchError> {
        let updated = {
            let mut batch = self.lock();
            let current = batch
                .get(id)
                .ok_or_else(|| BatchError::UnknownItem(id.to_string()))?;
            let next = f(&current)?;
            batch.replace(next);
            batch
                .get(id)
                .ok_or_else(|| BatchError::UnknownItem(id.to_string()))?
        };
        self.emit(BatchEvent::StatusChanged {
            id: updated.id.clone(),
            status: updated.status,
        });
        Ok(updated)
    }

    /// Apply `f` to the current value of `id`, only if `epoch` is still live.
    fn commit(&self, epoch: u64, id: &str, f: impl FnOnce(&WorkItem) -> WorkItem) -> Commit {
        let status = {
            let mut batch = self.lock();
            if self.epoch() != epoch {
                return Commit::Stale;
            }
            let Some(current) = batch.get(id) else {
                return Commit::Missing;
            };
            let next = f(&current);
            let status = next.status;
            batch.replace(next);
            status
        };
        self.emit(BatchEvent::StatusChanged {
            id: id.to_string(),
            status,
        });
        Commit::Applied
    }

    /// Process one item under `epoch`. `None` means the item vanished.
    async fn step<T: Transform>(
        &self,
        epoch: u64,
        item: &WorkItem,
        transform: &T,
    ) -> Option<ItemOutcome> {
        match self.commit(epoch, &item.id, |it| it.with_status(WorkStatus::Processing)) {
            Commit::Applied => {}
            Commit::Stale => return Some(ItemOutcome::Cancelled),
            Commit::Missing => return None,
        }

        let result = transform.apply(&item.id, &item.source).await;

        let (commit, outcome, failure) = match result {
            Ok(image) => (
                self.commit(epoch, &item.id, |it| it.completed(image)),
                ItemOutcome::Completed,
                None,
            ),
            Err(e) => {
                let message = e.user_message();
                let msg = message.clone();
                (
                    self.commit(epoch, &item.id, move |it| it.failed(msg)),
                    ItemOutcome::Failed,
                    Some(message),
                )
            }
        };

        match commit {
            Commit::Applied => {
                if let Some(message) = failure {
                    self.emit(BatchEvent::ItemFailed {
                        id: item.id.clone(),
                        message,
                    });
                }
                Some(outcome)
            }
            Commit::Stale => Some(ItemOutcome::Cancelled),
            Commit::Missing => None,
        }
    }

    /// Run `transform` over every item present when the call starts.
    ///
    /// With `skip_if_completed`, items already `Completed` are left alone.
    /// Returns [`RunOutcome::Cancelled`] if the epoch moved at any point.
    pub async fn run_batch<T: Transform>(
        &self,
        transform: &T,
        skip_if_completed: bool,
    ) -> RunOutcome {
        let epoch = self.epoch();
        let snapshot = self.snapshot();
        self.emit(BatchEvent::RunStarted {
            items: snapshot.len(),
        });

        let mut summary = RunSummary::default();
        for item in snapshot {
            if self.epoch() != epoch {
                return self.cancelled();
            }
            // Removed since the snapshot
            let Some(current) = self.get(&item.id) else {
                continue;
            };
            if skip_if_completed && current.status == WorkStatus::Completed {
                summary.skipped += 1;
                continue;
            }
            match self.step(epoch, &current, transform).await {
                Some(ItemOutcome::Completed) => summary.completed += 1,
                Some(ItemOutcome::Failed) => summary.failed += 1,
                Some(ItemOutcome::Cancelled) => return self.cancelled(),
                None => {}
            }
        }

        if self.epoch() != epoch {
            return self.cancelled();
        }
        self.emit(BatchEvent::RunFinished(summary));
        RunOutcome::Finished(summary)
    }

    /// Run `transform` on a single item, honouring the shared epoch.
    pub async fn run_one<T: Transform>(
        &self,
        id: &str,
        transform: &T,
    ) -> Result<ItemOutcome, BatchError> {
        let epoch = self.epoch();
        let item = self
            .get(id)
            .ok_or_else(|| BatchError::UnknownItem(id.to_string()))?;
        match self.step(epoch, &item, transform).await {
            Some(outcome) => Ok(outcome),
            None => Err(BatchError::UnknownItem(id.to_string())),
        }
    }

    fn cancelled(&self) -> RunOutcome {
        self.emit(BatchEvent::RunCancelled);
        RunOutcome::Cancelled
    }
}

impl Default for BatchRunner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITEMS)
    }
}
