//! Image geometry and resampling, in pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::load_from_memory`, `ImageReader` |
//! | **Grid tiles / crop window** | [`geometry`] (pure math) |
//! | **Fractional sample** | [`RustSampler`] (area + bilinear weights) |
//! | **Upscale** | `resize_exact` with `Lanczos3` |
//! | **Encode** | PNG via `image` |
//!
//! The module is split into:
//! - **Geometry**: Pure functions for rectangle math (unit testable)
//! - **Parameters**: Smoothing and crop tuning values
//! - **Backend**: [`Sampler`] trait + [`Image`]
//! - **Operations**: High-level functions combining geometry + backend

pub mod backend;
pub mod geometry;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{DecodeError, Dimensions, Image, SampleError, Sampler};
pub use geometry::{
    ASPECT_RATIOS, AspectRatio, CropSpec, GeometryError, GridSpec, GridType, TileRect,
    aspect_ratio, compute_crop_rect, compute_grid_tiles,
};
pub use operations::{
    OperationError, Tile, crop_image, split_image, upscale_dimensions, upscale_to_width,
};
pub use params::{CropTuning, Smoothing};
pub use rust_backend::{
    RustSampler, decode_bytes, encode_png, open_image, supported_input_extensions,
};
