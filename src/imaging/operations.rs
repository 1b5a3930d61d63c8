//! High-level image operations.
//!
//! These functions combine geometry with sampler execution.
//! They take configuration, compute rectangles, and call the sampler.

use super::backend::{Image, SampleError, Sampler};
use super::geometry::{
    CropSpec, GeometryError, GridSpec, TileRect, compute_crop_rect, compute_grid_tiles,
};
use super::params::CropTuning;
use rayon::prelude::*;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OperationError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Sample(#[from] SampleError),
}

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, OperationError>;

/// One output tile of a grid split.
#[derive(Debug, Clone)]
pub struct Tile {
    /// Row-major position, starting at 0.
    pub index: usize,
    pub col: u32,
    pub row: u32,
    pub rect: TileRect,
    pub image: Image,
}

/// Split an image into a uniform grid.
///
/// Tiles are sampled in parallel but the split is atomic: if any tile fails,
/// the whole split fails with that error and no tiles are returned.
pub fn split_image(sampler: &impl Sampler, image: &Image, grid: GridSpec) -> Result<Vec<Tile>> {
    let rects = compute_grid_tiles(image.width(), image.height(), grid)?;

    let tiles = rects
        .into_par_iter()
        .enumerate()
        .map(|(index, rect)| {
            let tile = sampler.sample(image, &rect)?;
            Ok(Tile {
                index,
                col: index as u32 % grid.cols,
                row: index as u32 / grid.cols,
                rect,
                image: tile,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(tiles)
}

/// Crop an image to the window described by `spec`.
pub fn crop_image(
    sampler: &impl Sampler,
    image: &Image,
    spec: &CropSpec,
    tuning: &CropTuning,
) -> Result<Image> {
    let rect = compute_crop_rect(image.width(), image.height(), spec, tuning)?;
    Ok(sampler.sample(image, &rect)?)
}

/// Output size for scaling `(width, height)` to `target_width`, keeping aspect.
///
/// Returns `None` when the image is already at least `target_width` wide.
pub fn upscale_dimensions(width: u32, height: u32, target_width: u32) -> Option<(u32, u32)> {
    if width == 0 || width >= target_width {
        return None;
    }
    let scale = target_width as f64 / width as f64;
    let h = ((height as f64 * scale).floor() as u32).max(1);
    Some((target_width, h))
}

/// Enlarge an image to `target_width` with the sampler's resize filter.
///
/// Images already at or above the target pass through unchanged.
pub fn upscale_to_width(sampler: &impl Sampler, image: &Image, target_width: u32) -> Result<Image> {
    match upscale_dimensions(image.width(), image.height(), target_width) {
        Some((w, h)) => Ok(sampler.resize(image, w, h)?),
        None => Ok(image.clone()),
    }
}
