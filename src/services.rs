//! Boundaries to the slow, fallible image services.
//!
//! Enhancement and background removal are external collaborators: the crate
//! only sees an async call that returns a new [`Image`] or a [`ServiceError`].
//! [`LocalUpscaler`] is the built-in enhancer: a high-quality resize to a
//! fixed target width, used when no remote enhancer is configured.

use crate::imaging::{Image, RustSampler, Sampler, upscale_to_width};
use std::future::Future;
use thiserror::Error;

/// Output width of [`LocalUpscaler`] by default (4K UHD).
pub const DEFAULT_TARGET_WIDTH: u32 = 3840;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("Authorization failed: {0}")]
    Auth(String),
    #[error("Service failed: {0}")]
    Service(String),
}

impl ServiceError {
    /// What the user can do about it, when there is something to do.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            ServiceError::Auth(_) => {
                Some("check the enhancement service API key and that it has quota left")
            }
            ServiceError::Service(_) => None,
        }
    }
}

/// Resolution enhancement service.
pub trait Enhancer {
    fn enhance(&self, image: &Image) -> impl Future<Output = Result<Image, ServiceError>>;
}

/// Background segmentation engine.
///
/// `progress` receives fractions in `0.0..=1.0`; it only drives a loading
/// indicator and may be called any number of times.
pub trait BackgroundRemover {
    fn remove_background(
        &self,
        image: &Image,
        progress: &dyn Fn(f32),
    ) -> impl Future<Output = Result<Image, ServiceError>>;
}

/// Enhancer that resizes to a target width with the sampler's best filter.
///
/// Images already at or above the target width are returned unchanged.
#[derive(Debug, Clone)]
pub struct LocalUpscaler<S = RustSampler> {
    sampler: S,
    target_width: u32,
}

impl LocalUpscaler<RustSampler> {
    pub fn new(target_width: u32) -> Self {
        Self::with_sampler(RustSampler::new(), target_width)
    }
}

impl Default for LocalUpscaler<RustSampler> {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_WIDTH)
    }
}

impl<S: Sampler> LocalUpscaler<S> {
    pub fn with_sampler(sampler: S, target_width: u32) -> Self {
        Self {
            sampler,
            target_width,
        }
    }

    pub fn target_width(&self) -> u32 {
        self.target_width
    }
}

impl<S: Sampler> Enhancer for LocalUpscaler<S> {
    async fn enhance(&self, image: &Image) -> Result<Image, ServiceError> {
        upscale_to_width(&self.sampler, image, self.target_width)
            .map_err(|e| ServiceError::Service(e.to_string()))
    }
}
