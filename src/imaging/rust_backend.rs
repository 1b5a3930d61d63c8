//! Pure Rust rasterization backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image` crate (pure Rust decoders) |
//! | Integer-aligned 1:1 sample | `DynamicImage::crop_imm`, then RGBA8 |
//! | Fractional sample | `fast_image_resize` Lanczos3 over a fractional crop box, premultiplied alpha |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` (or `Nearest`) |
//! | Encode → PNG | `image::codecs::png::PngEncoder` |

use super::backend::{DecodeError, Image, SampleError, Sampler};
use super::geometry::TileRect;
use super::params::Smoothing;
use fast_image_resize::{self as fir, MulDiv, PixelType, ResizeOptions};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, ImageReader, RgbaImage};
use std::io::Cursor;
use std::path::Path;
use std::sync::LazyLock;

/// Refuse to allocate destinations above this many pixels (~1 GiB of RGBA).
const MAX_PIXELS: u64 = 1 << 28;

const PHOTO_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    PHOTO_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Decode an in-memory file. `name` is only used in error messages.
pub fn decode_bytes(name: &str, bytes: &[u8]) -> Result<Image, DecodeError> {
    image::load_from_memory(bytes)
        .map(Image::new)
        .map_err(|e| DecodeError::Malformed {
            name: name.to_string(),
            reason: e.to_string(),
        })
}

/// Load and decode an image from disk.
pub fn open_image(path: &Path) -> Result<Image, DecodeError> {
    let malformed = |reason: String| DecodeError::Malformed {
        name: path.display().to_string(),
        reason,
    };
    ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map(Image::new)
        .map_err(|e| malformed(e.to_string()))
}

/// Encode as PNG, which keeps the alpha channel produced by crops and segmentation.
pub fn encode_png(image: &Image) -> Result<Vec<u8>, SampleError> {
    let mut buf = Cursor::new(Vec::new());
    image
        .pixels()
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| SampleError::RasterizationFailure(format!("PNG encode failed: {e}")))?;
    Ok(buf.into_inner())
}

/// Pure Rust sampler using the `image` crate.
///
/// See the [module docs](self) for the crate-to-operation mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustSampler {
    smoothing: Smoothing,
}

impl RustSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_smoothing(smoothing: Smoothing) -> Self {
        Self { smoothing }
    }
}

fn check_destination(width: u32, height: u32) -> Result<(), SampleError> {
    if width == 0 || height == 0 {
        return Err(SampleError::RasterizationFailure(format!(
            "cannot allocate a {width}x{height} surface"
        )));
    }
    if width as u64 * height as u64 > MAX_PIXELS {
        return Err(SampleError::RasterizationFailure(format!(
            "{width}x{height} surface exceeds the {MAX_PIXELS} pixel limit"
        )));
    }
    Ok(())
}

/// Integer-aligned, unscaled and fully inside the source.
fn exact_crop(rect: &TileRect, width: u32, height: u32) -> Option<(u32, u32)> {
    let aligned = rect.sx.fract() == 0.0
        && rect.sy.fract() == 0.0
        && rect.sw == rect.dw as f64
        && rect.sh == rect.dh as f64;
    let inside = rect.sx >= 0.0
        && rect.sy >= 0.0
        && rect.sx + rect.sw <= width as f64
        && rect.sy + rect.sh <= height as f64;
    (aligned && inside).then_some((rect.sx as u32, rect.sy as u32))
}

/// Destination span `[d0, d1)` whose source footprint lies inside `[0, len]`,
/// plus that footprint as `(offset, extent)`. `None` when nothing is visible.
fn visible_span(start: f64, extent: f64, dst: u32, len: u32) -> Option<(u32, u32, f64, f64)> {
    let step = extent / dst as f64;
    let to_dst = |s: f64| ((s - start) / step).round().clamp(0.0, dst as f64) as u32;
    let d0 = to_dst(start.max(0.0));
    let d1 = to_dst((start + extent).min(len as f64));
    if d1 <= d0 {
        return None;
    }
    let s0 = (start + d0 as f64 * step).max(0.0);
    let s1 = (start + d1 as f64 * step).min(len as f64);
    (s1 > s0).then_some((d0, d1, s0, s1 - s0))
}

fn fir_failure(context: &str, err: impl std::fmt::Debug) -> SampleError {
    SampleError::RasterizationFailure(format!("{context}: {err:?}"))
}

/// Resample the visible part of `rect` with `fast_image_resize`; the rest of
/// the destination stays transparent.
fn sample_rgba(
    src: RgbaImage,
    rect: &TileRect,
    smoothing: Smoothing,
) -> Result<RgbaImage, SampleError> {
    let (width, height) = src.dimensions();
    let mut canvas = RgbaImage::new(rect.dw, rect.dh);
    let (Some((dx0, dx1, left, crop_w)), Some((dy0, dy1, top, crop_h))) = (
        visible_span(rect.sx, rect.sw, rect.dw, width),
        visible_span(rect.sy, rect.sh, rect.dh, height),
    ) else {
        return Ok(canvas);
    };
    let (out_w, out_h) = (dx1 - dx0, dy1 - dy0);

    let mut src_image =
        fir::images::Image::from_vec_u8(width, height, src.into_raw(), PixelType::U8x4)
            .map_err(|e| fir_failure("source buffer", e))?;
    let mut dst_image = fir::images::Image::new(out_w, out_h, PixelType::U8x4);

    let (alg, premultiply) = match smoothing {
        Smoothing::High => (fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3), true),
        Smoothing::Off => (fir::ResizeAlg::Nearest, false),
    };
    let mul_div = MulDiv::default();
    if premultiply {
        mul_div
            .multiply_alpha_inplace(&mut src_image)
            .map_err(|e| fir_failure("premultiply alpha", e))?;
    }

    let options = ResizeOptions::new()
        .resize_alg(alg)
        .crop(left, top, crop_w, crop_h);
    fir::Resizer::new()
        .resize(&src_image, &mut dst_image, &options)
        .map_err(|e| fir_failure("resample", e))?;

    if premultiply {
        mul_div
            .divide_alpha_inplace(&mut dst_image)
            .map_err(|e| fir_failure("unpremultiply alpha", e))?;
    }

    let region = RgbaImage::from_raw(out_w, out_h, dst_image.into_vec()).ok_or_else(|| {
        SampleError::RasterizationFailure(format!("resampled buffer is not {out_w}x{out_h}"))
    })?;
    imageops::replace(&mut canvas, &region, dx0 as i64, dy0 as i64);
    Ok(canvas)
}

impl Sampler for RustSampler {
    fn sample(&self, image: &Image, rect: &TileRect) -> Result<Image, SampleError> {
        check_destination(rect.dw, rect.dh)?;
        let finite = [rect.sx, rect.sy, rect.sw, rect.sh]
            .iter()
            .all(|v| v.is_finite());
        if !finite || rect.sw <= 0.0 || rect.sh <= 0.0 {
            return Err(SampleError::RasterizationFailure(format!(
                "degenerate source rectangle {rect:?}"
            )));
        }

        // Both paths hand back RGBA8 so tiles of one source share a pixel format
        let pixels = image.pixels();
        if let Some((x, y)) = exact_crop(rect, pixels.width(), pixels.height()) {
            let tile = pixels.crop_imm(x, y, rect.dw, rect.dh).into_rgba8();
            return Ok(Image::new(DynamicImage::ImageRgba8(tile)));
        }

        let sampled = sample_rgba(pixels.to_rgba8(), rect, self.smoothing)?;
        Ok(Image::new(DynamicImage::ImageRgba8(sampled)))
    }

    fn resize(&self, image: &Image, width: u32, height: u32) -> Result<Image, SampleError> {
        check_destination(width, height)?;
        let filter = match self.smoothing {
            Smoothing::High => FilterType::Lanczos3,
            Smoothing::Off => FilterType::Nearest,
        };
        Ok(Image::new(image.pixels().resize_exact(width, height, filter)))
    }
}
