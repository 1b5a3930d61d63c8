//! Rasterization backend trait and shared types.
//!
//! The [`Sampler`] trait is the drawing-surface boundary: every pixel the
//! crate produces goes through one of its two operations, sample (fractional
//! source rectangle → integer destination) and resize (whole image → new
//! size).
//!
//! The production implementation is
//! [`RustSampler`](super::rust_backend::RustSampler) built on the `image`
//! crate. Tests use a recording mock.

use super::geometry::TileRect;
use image::DynamicImage;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SampleError {
    #[error("Rasterization failed: {0}")]
    RasterizationFailure(String),
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode {name}: {reason}")]
    Malformed { name: String, reason: String },
}

/// Width and height of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// A decoded, immutable raster.
///
/// Cloning is cheap and shares the pixels. Every transform produces a new
/// `Image`; nothing writes into an existing one.
#[derive(Clone)]
pub struct Image {
    pixels: Arc<DynamicImage>,
}

impl Image {
    pub fn new(pixels: DynamicImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width(),
            height: self.height(),
        }
    }

    pub fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }

    /// True when both handles share the same pixel buffer.
    pub fn same_pixels(&self, other: &Image) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}

impl From<DynamicImage> for Image {
    fn from(pixels: DynamicImage) -> Self {
        Self::new(pixels)
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Trait for rasterization backends.
///
/// Implementations must be deterministic and side-effect free apart from
/// allocating the destination; callers never retry a failed sample.
pub trait Sampler: Sync {
    /// Resample `rect` of `image` into a new `rect.dw × rect.dh` image.
    fn sample(&self, image: &Image, rect: &TileRect) -> Result<Image, SampleError>;

    /// Resize the whole image to exactly `width × height`.
    fn resize(&self, image: &Image, width: u32, height: u32) -> Result<Image, SampleError>;
}
