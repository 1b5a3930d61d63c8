//! Batch resolution enhancement.

use super::{ImageQueue, WorkflowError, run_all, run_single};
use crate::archive::ArchiveEntry;
use crate::batch::{BatchEvent, DEFAULT_MAX_ITEMS, ItemOutcome, RunOutcome, Transform, TransformError};
use crate::imaging::Image;
use crate::naming::enhanced_download_name;
use crate::services::{Enhancer, LocalUpscaler};
use std::sync::mpsc::Sender;
use std::time::Duration;

/// Runs an [`Enhancer`] as a batch transform.
pub struct Enhance<'a, E>(pub &'a E);

impl<E: Enhancer> Transform for Enhance<'_, E> {
    async fn apply(&self, _id: &str, source: &Image) -> Result<Image, TransformError> {
        Ok(self.0.enhance(source).await?)
    }
}

pub struct EnhanceWorkflow<E = LocalUpscaler> {
    enhancer: E,
    timeout: Option<Duration>,
    queue: ImageQueue,
}

impl<E: Enhancer> EnhanceWorkflow<E> {
    pub fn new(enhancer: E) -> Self {
        Self::with_limit(enhancer, DEFAULT_MAX_ITEMS)
    }

    pub fn with_limit(enhancer: E, limit: usize) -> Self {
        Self {
            enhancer,
            timeout: None,
            queue: ImageQueue::new("enhance", limit),
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

    /// Enhance everything not already enhanced.
    pub async fn process_all(&self) -> RunOutcome {
        run_all(self.queue.runner(), Enhance(&self.enhancer), self.timeout, true).await
    }

    /// Re-run one item, typically after a failure.
    pub async fn retry(&self, id: &str) -> Result<ItemOutcome, WorkflowError> {
        Ok(run_single(self.queue.runner(), id, Enhance(&self.enhancer), self.timeout).await?)
    }

    /// Enhanced images named `4k-{stem}.png`.
    pub fn downloads(&self) -> Vec<ArchiveEntry> {
        self.queue.completed_entries(enhanced_download_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ServiceError;
    use crate::test_helpers::gradient_image;
    use crate::types::WorkStatus;
    use std::cell::RefCell;

    /// Enhancer that fails with a scripted error for listed widths.
    #[derive(Default)]
    struct FlakyEnhancer {
        auth_fail_width: Option<u32>,
        seen: RefCell<Vec<u32>>,
    }

    impl Enhancer for FlakyEnhancer {
        async fn enhance(&self, image: &Image) -> Result<Image, ServiceError> {
            self.seen.borrow_mut().push(image.width());
            if self.auth_fail_width == Some(image.width()) {
                return Err(ServiceError::Auth("401".into()));
            }
            Ok(image.clone())
        }
    }

    fn load(wf: &EnhanceWorkflow<impl Enhancer>) {
        wf.queue()
            .add_all((1..=3).map(|i| (format!("p{i}.jpg"), gradient_image(i * 10, 10))))
            .unwrap();
    }

    #[tokio::test]
    async fn auth_failure_is_isolated_and_actionable() {
        let wf = EnhanceWorkflow::new(FlakyEnhancer {
            auth_fail_width: Some(20),
            ..Default::default()
        });
        load(&wf);
        let outcome = wf.process_all().await;

        assert!(matches!(outcome, RunOutcome::Finished(s) if s.completed == 2 && s.failed == 1));
        let failed = wf.queue().get("enhance-2").unwrap();
        assert_eq!(failed.status, WorkStatus::Failed);
        assert!(failed.error.as_deref().unwrap().contains("quota"));
    }

    #[tokio::test]
    async fn process_all_skips_completed() {
        let wf = EnhanceWorkflow::new(FlakyEnhancer::default());
        load(&wf);
        wf.process_all().await;
        wf.process_all().await;
        assert_eq!(*wf.enhancer.seen.borrow(), vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn retry_single_item() {
        let wf = EnhanceWorkflow::new(FlakyEnhancer::default());
        load(&wf);
        assert_eq!(wf.retry("enhance-3").await.unwrap(), ItemOutcome::Completed);
        assert_eq!(*wf.enhancer.seen.borrow(), vec![30]);
        assert!(matches!(
            wf.retry("enhance-9").await,
            Err(WorkflowError::Batch(_))
        ));
    }

    #[tokio::test]
    async fn downloads_use_4k_prefix() {
        let wf = EnhanceWorkflow::new(FlakyEnhancer::default());
        load(&wf);
        wf.retry("enhance-1").await.unwrap();
        let names: Vec<_> = wf.downloads().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["4k-p1.png"]);
    }

    #[tokio::test]
    async fn local_upscaler_workflow() {
        let wf = EnhanceWorkflow::new(LocalUpscaler::new(64));
        wf.queue().add("small.png", gradient_image(16, 8)).unwrap();
        wf.process_all().await;
        let item = wf.queue().get("enhance-1").unwrap();
        assert_eq!(item.result.as_ref().unwrap().width(), 64);
        assert_eq!(item.result.as_ref().unwrap().height(), 32);
    }
}
