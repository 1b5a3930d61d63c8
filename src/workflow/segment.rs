//! Batch background removal.
//!
//! The segmentation engine reports progress while it loads its model; that
//! only drives a "model loading" flag. The flag is raised once when a run
//! starts and clears once progress passes [`LOADED_PROGRESS`] or the first
//! call returns. Later items in the same run leave it down.

use super::{ImageQueue, WorkflowError, run_all, run_single};
use crate::archive::ArchiveEntry;
use crate::batch::{
    BatchEvent, DEFAULT_MAX_ITEMS, ItemOutcome, RunOutcome, Transform, TransformError,
};
use crate::imaging::Image;
use crate::naming::no_background_name;
use crate::services::BackgroundRemover;
use image::DynamicImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::time::Duration;

/// Progress above which the model counts as loaded.
pub const LOADED_PROGRESS: f32 = 0.1;

/// Runs a [`BackgroundRemover`] as a batch transform.
///
/// Only ever lowers `loading`; raising it is up to whoever starts the run.
pub struct Segment<'a, R> {
    remover: &'a R,
    loading: &'a AtomicBool,
}

impl<'a, R: BackgroundRemover> Segment<'a, R> {
    pub fn new(remover: &'a R, loading: &'a AtomicBool) -> Self {
        Self { remover, loading }
    }
}

impl<R: BackgroundRemover> Transform for Segment<'_, R> {
    async fn apply(&self, _id: &str, source: &Image) -> Result<Image, TransformError> {
        let progress = |p: f32| {
            if p > LOADED_PROGRESS {
                self.loading.store(false, Ordering::SeqCst);
            }
        };
        let result = self.remover.remove_background(source, &progress).await;
        self.loading.store(false, Ordering::SeqCst);
        Ok(with_alpha(result?))
    }
}

/// Cut-outs are always RGBA so transparency survives export.
fn with_alpha(image: Image) -> Image {
    if image.pixels().color().has_alpha() {
        image
    } else {
        Image::new(DynamicImage::ImageRgba8(image.pixels().to_rgba8()))
    }
}

pub struct SegmentWorkflow<R> {
    remover: R,
    timeout: Option<Duration>,
    loading: AtomicBool,
    queue: ImageQueue,
}

impl<R: BackgroundRemover> SegmentWorkflow<R> {
    pub fn new(remover: R) -> Self {
        Self::with_limit(remover, DEFAULT_MAX_ITEMS)
    }

    pub fn with_limit(remover: R, limit: usize) -> Self {
        Self {
            remover,
            timeout: None,
            loading: AtomicBool::new(false),
            queue: ImageQueue::new("segment", limit),
        }
    }

    pub fn with_events(mut self, sender: Sender<BatchEvent>) -> Self {
        self.queue = self.queue.with_events(sender);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn queue(&self) -> &ImageQueue {
        &self.queue
    }

    /// True while the engine is still loading its model.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    fn transform(&self) -> Segment<'_, R> {
        Segment::new(&self.remover, &self.loading)
    }

    pub async fn process_all(&self) -> RunOutcome {
        self.loading.store(true, Ordering::SeqCst);
        let outcome = run_all(self.queue.runner(), self.transform(), self.timeout, true).await;
        self.loading.store(false, Ordering::SeqCst);
        outcome
    }

    pub async fn retry(&self, id: &str) -> Result<ItemOutcome, WorkflowError> {
        self.loading.store(true, Ordering::SeqCst);
        let outcome = run_single(self.queue.runner(), id, self.transform(), self.timeout).await;
        self.loading.store(false, Ordering::SeqCst);
        Ok(outcome?)
    }

    /// Cut-outs named `no_bg_{stem}.png`.
    pub fn downloads(&self) -> Vec<ArchiveEntry> {
        self.queue.completed_entries(no_background_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ServiceError;
    use crate::test_helpers::solid_image;
    use crate::types::WorkStatus;
    use image::RgbImage;
    use std::cell::RefCell;

    /// Remover that reports scripted progress and records the loading flag
    /// seen after each report.
    struct ScriptedRemover<'a> {
        steps: Vec<f32>,
        flag: &'a AtomicBool,
        observed: RefCell<Vec<bool>>,
        fail: bool,
    }

    impl BackgroundRemover for ScriptedRemover<'_> {
        async fn remove_background(
            &self,
            image: &Image,
            progress: &dyn Fn(f32),
        ) -> Result<Image, ServiceError> {
            for &p in &self.steps {
                progress(p);
                self.observed
                    .borrow_mut()
                    .push(self.flag.load(Ordering::SeqCst));
            }
            if self.fail {
                return Err(ServiceError::Service("segmentation crashed".into()));
            }
            let (w, h) = (image.width(), image.height());
            Ok(Image::new(DynamicImage::ImageRgb8(RgbImage::new(w, h))))
        }
    }

    #[tokio::test]
    async fn loading_flag_clears_after_first_real_progress() {
        let flag = AtomicBool::new(true);
        let remover = ScriptedRemover {
            steps: vec![0.0, 0.05, 0.1, 0.5, 1.0],
            flag: &flag,
            observed: RefCell::new(Vec::new()),
            fail: false,
        };
        let transform = Segment::new(&remover, &flag);
        let out = transform
            .apply("x", &solid_image(3, 2, [1, 2, 3, 255]))
            .await
            .unwrap();

        assert_eq!(
            *remover.observed.borrow(),
            vec![true, true, true, false, false]
        );
        assert!(!flag.load(Ordering::SeqCst));
        assert!(out.pixels().color().has_alpha());
    }

    #[tokio::test]
    async fn loading_flag_clears_on_failure() {
        let flag = AtomicBool::new(true);
        let remover = ScriptedRemover {
            steps: vec![0.0],
            flag: &flag,
            observed: RefCell::new(Vec::new()),
            fail: true,
        };
        let err = Segment::new(&remover, &flag)
            .apply("x", &solid_image(1, 1, [0, 0, 0, 255]))
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::Service(_)));
        assert_eq!(*remover.observed.borrow(), vec![true]);
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn second_item_does_not_raise_loading_again() {
        let flag = AtomicBool::new(true);
        let remover = ScriptedRemover {
            steps: vec![0.0],
            flag: &flag,
            observed: RefCell::new(Vec::new()),
            fail: false,
        };
        let transform = Segment::new(&remover, &flag);
        let image = solid_image(2, 2, [5, 5, 5, 255]);
        transform.apply("a", &image).await.unwrap();
        transform.apply("b", &image).await.unwrap();
        assert_eq!(*remover.observed.borrow(), vec![true, false]);
    }

    /// Remover that waits for the test before each image.
    struct Gated<'a> {
        gate: &'a tokio::sync::Notify,
    }

    impl BackgroundRemover for Gated<'_> {
        async fn remove_background(
            &self,
            image: &Image,
            progress: &dyn Fn(f32),
        ) -> Result<Image, ServiceError> {
            self.gate.notified().await;
            progress(0.05);
            Ok(image.clone())
        }
    }

    #[tokio::test]
    async fn loading_flag_is_raised_once_per_run() {
        let gate = tokio::sync::Notify::new();
        let wf = SegmentWorkflow::new(Gated { gate: &gate });
        wf.queue()
            .add_all((1..=2).map(|i| (format!("{i}.png"), solid_image(2, 2, [1, 1, 1, 255]))))
            .unwrap();

        let (outcome, ()) = tokio::join!(wf.process_all(), async {
            while wf.queue().count(WorkStatus::Processing) == 0 {
                tokio::task::yield_now().await;
            }
            assert!(wf.is_loading());
            gate.notify_one();

            while wf.queue().count(WorkStatus::Completed) == 0 {
                tokio::task::yield_now().await;
            }
            assert!(!wf.is_loading());
            gate.notify_one();
        });

        assert!(matches!(outcome, RunOutcome::Finished(s) if s.completed == 2));
        assert!(!wf.is_loading());
    }

    /// Remover that cuts every image to transparent pixels.
    struct Eraser;

    impl BackgroundRemover for Eraser {
        async fn remove_background(
            &self,
            image: &Image,
            progress: &dyn Fn(f32),
        ) -> Result<Image, ServiceError> {
            progress(1.0);
            Ok(solid_image(image.width(), image.height(), [0, 0, 0, 0]))
        }
    }

    #[tokio::test]
    async fn workflow_processes_queue_and_names_downloads() {
        let wf = SegmentWorkflow::new(Eraser);
        wf.queue()
            .add_all(vec![
                ("cat.jpeg".to_string(), solid_image(4, 4, [9, 9, 9, 255])),
                ("dog.webp".to_string(), solid_image(4, 4, [9, 9, 9, 255])),
            ])
            .unwrap();
        let outcome = wf.process_all().await;

        assert!(matches!(outcome, RunOutcome::Finished(s) if s.completed == 2));
        assert_eq!(wf.queue().count(WorkStatus::Completed), 2);
        assert!(!wf.is_loading());
        let names: Vec<_> = wf.downloads().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["no_bg_cat.png", "no_bg_dog.png"]);
    }

    #[tokio::test]
    async fn retry_refuses_unknown_item() {
        let wf = SegmentWorkflow::new(Eraser);
        let err = wf.retry("segment-1").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Batch(_)));
    }
}
