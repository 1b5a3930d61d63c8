//! Batch cropping to a shared aspect ratio with a per-item pan.
//!
//! Each item carries its own pan offset, in percent of the sampling window.
//! The crop transform reads the pan and ratio when it runs, so a result always
//! matches the parameters current at that moment. Changing an item's pan sends
//! it back to `Pending`; changing the ratio resets every item and every pan.

use super::{ImageQueue, WorkflowError, ensure_idle, run_all, run_single};
use crate::archive::ArchiveEntry;
use crate::batch::{
    BatchError, BatchEvent, DEFAULT_MAX_ITEMS, ItemOutcome, RunOutcome, SyncTransform,
    TransformError,
};
use crate::imaging::{
    AspectRatio, CropSpec, CropTuning, GeometryError, Image, RustSampler, Sampler, aspect_ratio,
    crop_image,
};
use crate::naming::crop_download_name;
use crate::types::{ItemId, WorkStatus};
use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Pan offset in percent of the sampling window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pan {
    pub x: f64,
    pub y: f64,
}

pub struct CropWorkflow<S = RustSampler> {
    sampler: S,
    tuning: CropTuning,
    ratio: Mutex<AspectRatio>,
    pans: Mutex<HashMap<ItemId, Pan>>,
    queue: ImageQueue,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CropWorkflow<RustSampler> {
    pub fn new(ratio: AspectRatio, tuning: CropTuning) -> Self {
        Self::with_sampler(RustSampler::new(), ratio, tuning, DEFAULT_MAX_ITEMS)
    }
}

impl<S: Sampler> CropWorkflow<S> {
    pub fn with_sampler(sampler: S, ratio: AspectRatio, tuning: CropTuning, limit: usize) -> Self {
        Self {
            sampler,
            tuning,
            ratio: Mutex::new(ratio),
            pans: Mutex::new(HashMap::new()),
            queue: ImageQueue::new("crop", limit),
        }
    }

    pub fn with_events(mut self, sender: Sender<BatchEvent>) -> Self {
        self.queue = self.queue.with_events(sender);
        self
    }

    pub fn queue(&self) -> &ImageQueue {
        &self.queue
    }

    pub fn tuning(&self) -> CropTuning {
        self.tuning
    }

    pub fn ratio(&self) -> AspectRatio {
        *lock(&self.ratio)
    }

    /// Switch every item to a new ratio preset.
    ///
    /// Cancels any run in flight, recentres every pan and resets every item
    /// to `Pending`.
    pub fn set_ratio(&self, label: &str) -> Result<AspectRatio, WorkflowError> {
        let ratio = aspect_ratio(label).ok_or_else(|| {
            WorkflowError::Geometry(GeometryError::InvalidLayout(format!(
                "unknown crop ratio '{label}'"
            )))
        })?;
        self.queue.cancel();
        *lock(&self.ratio) = ratio;
        lock(&self.pans).clear();
        for item in self.queue.items() {
            self.reset_item(&item.id)?;
        }
        Ok(ratio)
    }

    /// Send `id` back to `Pending`. An item removed in the meantime is skipped.
    fn reset_item(&self, id: &str) -> Result<(), WorkflowError> {
        match self.queue.runner().update(id, |it| Ok(it.reset())) {
            Ok(_) | Err(BatchError::UnknownItem(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn pan(&self, id: &str) -> Pan {
        lock(&self.pans).get(id).copied().unwrap_or_default()
    }

    /// Move an item's crop window. The item goes back to `Pending`.
    ///
    /// Refused while the item is being processed.
    pub fn set_pan(&self, id: &str, pan: Pan) -> Result<(), WorkflowError> {
        self.queue.runner().update(id, |it| {
            if it.status == WorkStatus::Processing {
                return Err(BatchError::Busy(id.to_string()));
            }
            Ok(it.reset())
        })?;
        lock(&self.pans).insert(id.to_string(), pan);
        Ok(())
    }

    /// Apply a drag of `dx, dy` pixels on top of the current pan.
    pub fn drag(&self, id: &str, dx: f64, dy: f64) -> Result<Pan, WorkflowError> {
        let current = self.pan(id);
        let next = Pan {
            x: current.x + dx * self.tuning.drag_sensitivity,
            y: current.y + dy * self.tuning.drag_sensitivity,
        };
        self.set_pan(id, next)?;
        Ok(next)
    }

    fn spec_for(&self, id: &str) -> CropSpec {
        let pan = self.pan(id);
        CropSpec {
            ratio: self.ratio().ratio,
            pan_x: pan.x,
            pan_y: pan.y,
        }
    }

    fn crop(&self, id: &str, source: &Image) -> Result<Image, TransformError> {
        Ok(crop_image(&self.sampler, source, &self.spec_for(id), &self.tuning)?)
    }

    /// The crop an item would get right now, without changing its status.
    pub fn preview(&self, id: &str) -> Result<Image, WorkflowError> {
        let item = self
            .queue
            .get(id)
            .ok_or_else(|| BatchError::UnknownItem(id.to_string()))?;
        Ok(crop_image(
            &self.sampler,
            &item.source,
            &self.spec_for(id),
            &self.tuning,
        )?)
    }

    /// Crop every item not already cropped with its current parameters.
    pub async fn process_all(&self) -> RunOutcome {
        let transform = SyncTransform(|id: &str, source: &Image| self.crop(id, source));
        run_all(self.queue.runner(), transform, None, true).await
    }

    pub async fn process_one(&self, id: &str) -> Result<ItemOutcome, WorkflowError> {
        let transform = SyncTransform(|id: &str, source: &Image| self.crop(id, source));
        Ok(run_single(self.queue.runner(), id, transform, None).await?)
    }

    /// Remove an item and forget its pan.
    pub fn remove(&self, id: &str) -> Result<(), WorkflowError> {
        ensure_idle(self.queue.runner(), id)?;
        self.queue.remove(id)?;
        lock(&self.pans).remove(id);
        Ok(())
    }

    pub fn clear(&self) {
        self.queue.clear();
        lock(&self.pans).clear();
    }

    /// Cropped images named `crop_{stem}.png`.
    pub fn downloads(&self) -> Vec<ArchiveEntry> {
        self.queue.completed_entries(crop_download_name)
    }
}
