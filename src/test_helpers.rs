//! Shared test utilities for the tilesmith test suite.
//!
//! Provides synthetic images, batches of work items, and a scripted
//! transform that records calls and fails on demand.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let runner = BatchRunner::default();
//! runner.add_all(items(3)).unwrap();
//!
//! let transform = ScriptedTransform::failing(&["item-2"]).on_call(|id| println!("{id}"));
//! runner.run_batch(&transform, true).await;
//! assert_eq!(transform.calls(), vec!["item-1", "item-2", "item-3"]);
//! ```

use std::cell::RefCell;
use std::time::Duration;

use image::{DynamicImage, Rgba, RgbaImage};

use crate::batch::{Transform, TransformError};
use crate::imaging::Image;
use crate::services::ServiceError;
use crate::types::WorkItem;

// =========================================================================
// Images
// =========================================================================

/// Opaque RGBA image whose every pixel is distinct along x and y.
pub fn gradient_image(width: u32, height: u32) -> Image {
    let buf = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x + y) % 256) as u8,
            255,
        ])
    });
    Image::new(DynamicImage::ImageRgba8(buf))
}

pub fn solid_image(width: u32, height: u32, rgba: [u8; 4]) -> Image {
    Image::new(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        width,
        height,
        Rgba(rgba),
    )))
}

/// `n` pending items with ids `item-1..=item-n`.
pub fn items(n: usize) -> Vec<WorkItem> {
    (1..=n)
        .map(|i| {
            WorkItem::new(
                format!("item-{i}"),
                format!("item-{i}.png"),
                gradient_image(8, 6),
            )
        })
        .collect()
}

// =========================================================================
// Transforms
// =========================================================================

/// Transform that copies its input, records every call, and fails for the
/// ids it was told to fail.
pub struct ScriptedTransform<'a> {
    fail: Vec<String>,
    calls: RefCell<Vec<String>>,
    hook: Option<Box<dyn Fn(&str) + 'a>>,
    sleep: Option<Duration>,
}

impl ScriptedTransform<'static> {
    pub fn new() -> Self {
        Self {
            fail: Vec::new(),
            calls: RefCell::new(Vec::new()),
            hook: None,
            sleep: None,
        }
    }

    pub fn failing(ids: &[&str]) -> Self {
        Self {
            fail: ids.iter().map(|s| s.to_string()).collect(),
            ..Self::new()
        }
    }
}

impl<'a> ScriptedTransform<'a> {
    /// Run `hook` inside every call, before the transform resolves.
    pub fn on_call<'b>(self, hook: impl Fn(&str) + 'b) -> ScriptedTransform<'b> {
        ScriptedTransform {
            fail: self.fail,
            calls: self.calls,
            hook: Some(Box::new(hook)),
            sleep: self.sleep,
        }
    }

    /// Sleep this long inside every call.
    pub fn sleeping(mut self, duration: Duration) -> Self {
        self.sleep = Some(duration);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl Transform for ScriptedTransform<'_> {
    async fn apply(&self, id: &str, source: &Image) -> Result<Image, TransformError> {
        self.calls.borrow_mut().push(id.to_string());
        if let Some(hook) = &self.hook {
            hook(id);
        }
        if let Some(duration) = self.sleep {
            tokio::time::sleep(duration).await;
        }
        if self.fail.iter().any(|f| f == id) {
            return Err(ServiceError::Service("scripted failure".into()).into());
        }
        Ok(Image::new(source.pixels().clone()))
    }
}
