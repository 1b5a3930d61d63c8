//! Pure rectangle math for grid splitting and cropping.
//!
//! All functions here are pure and testable without any I/O or images.
//!
//! ## Grid splitting
//!
//! A `cols × rows` grid over a `W × H` image produces tiles that all share the
//! same integer output size:
//!
//! ```text
//! dw = floor(W / cols)      sw = W / cols   (exact, unrounded)
//! dh = floor(H / rows)      sh = H / rows
//! sx = col * sw             sy = row * sh
//! ```
//!
//! The output size is rounded once and reused for every tile, so no tile can
//! end up one pixel wider than its neighbour. Source coordinates step in exact
//! floating point so tile boundaries never drift across the grid.
//!
//! ## Cropping
//!
//! The crop window is the largest rectangle of the requested aspect that fits
//! the source, magnified by a zoom constant and shifted by a pan expressed as
//! a percentage of the sampling window.

use super::params::CropTuning;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Invalid layout: {0}")]
    InvalidLayout(String),
}

/// Number of columns and rows of a uniform grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSpec {
    pub cols: u32,
    pub rows: u32,
}

impl GridSpec {
    pub const fn new(cols: u32, rows: u32) -> Self {
        Self { cols, rows }
    }

    pub fn tile_count(self) -> u32 {
        self.cols * self.rows
    }
}

/// A source sampling rectangle paired with an integer output size.
///
/// `(sx, sy, sw, sh)` lives in source-pixel space and is fractional;
/// `(dw, dh)` is the size of the image the sampler allocates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileRect {
    pub sx: f64,
    pub sy: f64,
    pub sw: f64,
    pub sh: f64,
    pub dw: u32,
    pub dh: u32,
}

/// Target aspect ratio plus the user's pan offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropSpec {
    /// Width divided by height.
    pub ratio: f64,
    pub pan_x: f64,
    pub pan_y: f64,
}

impl CropSpec {
    pub fn centered(ratio: f64) -> Self {
        Self {
            ratio,
            pan_x: 0.0,
            pan_y: 0.0,
        }
    }
}

/// Compute every tile of a grid in row-major order.
///
/// Fails with [`GeometryError::InvalidLayout`] when the image or grid is empty,
/// or when the grid is finer than the image so a tile would be zero pixels wide.
///
/// # Examples
/// ```
/// # use tilesmith::imaging::{GridSpec, compute_grid_tiles};
/// let tiles = compute_grid_tiles(1920, 1080, GridSpec::new(3, 3)).unwrap();
/// assert_eq!(tiles.len(), 9);
/// assert!(tiles.iter().all(|t| (t.dw, t.dh) == (640, 360)));
/// ```
pub fn compute_grid_tiles(
    width: u32,
    height: u32,
    grid: GridSpec,
) -> Result<Vec<TileRect>, GeometryError> {
    if width == 0 || height == 0 {
        return Err(GeometryError::InvalidLayout(format!(
            "image must be at least 1x1, got {width}x{height}"
        )));
    }
    if grid.cols == 0 || grid.rows == 0 {
        return Err(GeometryError::InvalidLayout(format!(
            "grid must have at least one column and row, got {}x{}",
            grid.cols, grid.rows
        )));
    }

    let dw = width / grid.cols;
    let dh = height / grid.rows;
    if dw == 0 || dh == 0 {
        return Err(GeometryError::InvalidLayout(format!(
            "{}x{} grid is finer than the {width}x{height} image",
            grid.cols, grid.rows
        )));
    }

    let sw = width as f64 / grid.cols as f64;
    let sh = height as f64 / grid.rows as f64;

    let tiles = (0..grid.rows)
        .flat_map(|row| {
            (0..grid.cols).map(move |col| TileRect {
                sx: col as f64 * sw,
                sy: row as f64 * sh,
                sw,
                sh,
                dw,
                dh,
            })
        })
        .collect();

    Ok(tiles)
}

/// Derive the source window for a crop.
///
/// The destination is the largest `ratio`-shaped rectangle that fits inside
/// the source. The sampling window is that rectangle divided by
/// `tuning.zoom`, centered, then moved by `pan_x`/`pan_y` percent of the
/// sampling window. Positive pan moves the window right/down. Pan is not
/// clamped here; whoever produces it bounds it.
pub fn compute_crop_rect(
    width: u32,
    height: u32,
    spec: &CropSpec,
    tuning: &CropTuning,
) -> Result<TileRect, GeometryError> {
    if width == 0 || height == 0 {
        return Err(GeometryError::InvalidLayout(format!(
            "image must be at least 1x1, got {width}x{height}"
        )));
    }
    if !(spec.ratio.is_finite() && spec.ratio > 0.0) {
        return Err(GeometryError::InvalidLayout(format!(
            "crop ratio must be positive, got {}",
            spec.ratio
        )));
    }
    if !(tuning.zoom.is_finite() && tuning.zoom > 0.0) {
        return Err(GeometryError::InvalidLayout(format!(
            "crop zoom must be positive, got {}",
            tuning.zoom
        )));
    }

    let (w, h) = (width as f64, height as f64);
    let (fit_w, fit_h) = if w / h > spec.ratio {
        (h * spec.ratio, h)
    } else {
        (w, w / spec.ratio)
    };

    let dw = fit_w.floor() as u32;
    let dh = fit_h.floor() as u32;
    if dw == 0 || dh == 0 {
        return Err(GeometryError::InvalidLayout(format!(
            "ratio {} leaves no pixels on a {width}x{height} image",
            spec.ratio
        )));
    }

    let sw = fit_w / tuning.zoom;
    let sh = fit_h / tuning.zoom;
    let sx = (w - sw) / 2.0 + spec.pan_x * (sw / 100.0);
    let sy = (h - sh) / 2.0 + spec.pan_y * (sh / 100.0);

    Ok(TileRect {
        sx,
        sy,
        sw,
        sh,
        dw,
        dh,
    })
}

const G4_LAYOUTS: [GridSpec; 1] = [GridSpec { cols: 2, rows: 2 }];
const G6_LAYOUTS: [GridSpec; 2] = [GridSpec { cols: 3, rows: 2 }, GridSpec { cols: 2, rows: 3 }];
const G8_LAYOUTS: [GridSpec; 2] = [GridSpec { cols: 4, rows: 2 }, GridSpec { cols: 2, rows: 4 }];
const G9_LAYOUTS: [GridSpec; 1] = [GridSpec { cols: 3, rows: 3 }];
const G12_LAYOUTS: [GridSpec; 2] = [GridSpec { cols: 4, rows: 3 }, GridSpec { cols: 3, rows: 4 }];

/// Advertised tile counts offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum GridType {
    G4,
    G6,
    G8,
    G9,
    G12,
}

impl GridType {
    pub const ALL: [GridType; 5] = [
        GridType::G4,
        GridType::G6,
        GridType::G8,
        GridType::G9,
        GridType::G12,
    ];

    pub fn tile_count(self) -> u32 {
        match self {
            GridType::G4 => 4,
            GridType::G6 => 6,
            GridType::G8 => 8,
            GridType::G9 => 9,
            GridType::G12 => 12,
        }
    }

    /// Layouts for this count; landscape first where there is a choice.
    pub fn layouts(self) -> &'static [GridSpec] {
        match self {
            GridType::G4 => &G4_LAYOUTS,
            GridType::G6 => &G6_LAYOUTS,
            GridType::G8 => &G8_LAYOUTS,
            GridType::G9 => &G9_LAYOUTS,
            GridType::G12 => &G12_LAYOUTS,
        }
    }

    /// Pick one layout by index.
    pub fn layout(self, index: usize) -> Result<GridSpec, GeometryError> {
        self.layouts().get(index).copied().ok_or_else(|| {
            GeometryError::InvalidLayout(format!(
                "grid {} has {} layout(s), index {index} requested",
                self.tile_count(),
                self.layouts().len()
            ))
        })
    }
}

impl TryFrom<u32> for GridType {
    type Error = GeometryError;

    fn try_from(count: u32) -> Result<Self, Self::Error> {
        GridType::ALL
            .into_iter()
            .find(|g| g.tile_count() == count)
            .ok_or_else(|| {
                GeometryError::InvalidLayout(format!(
                    "unsupported tile count {count} (expected 4, 6, 8, 9 or 12)"
                ))
            })
    }
}

impl From<GridType> for u32 {
    fn from(grid: GridType) -> u32 {
        grid.tile_count()
    }
}

/// A named crop aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AspectRatio {
    pub label: &'static str,
    pub ratio: f64,
}

pub const ASPECT_RATIOS: &[AspectRatio] = &[
    AspectRatio { label: "1:1", ratio: 1.0 },
    AspectRatio { label: "4:5", ratio: 4.0 / 5.0 },
    AspectRatio { label: "3:4", ratio: 3.0 / 4.0 },
    AspectRatio { label: "4:3", ratio: 4.0 / 3.0 },
    AspectRatio { label: "9:16", ratio: 9.0 / 16.0 },
    AspectRatio { label: "16:9", ratio: 16.0 / 9.0 },
    AspectRatio { label: "21:9", ratio: 21.0 / 9.0 },
    AspectRatio { label: "2.35:1", ratio: 2.35 },
    AspectRatio { label: "2:3", ratio: 2.0 / 3.0 },
    AspectRatio { label: "3:2", ratio: 3.0 / 2.0 },
];

/// Look up a preset ratio by its label (`"16:9"`).
pub fn aspect_ratio(label: &str) -> Option<AspectRatio> {
    ASPECT_RATIOS.iter().find(|r| r.label == label).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // compute_grid_tiles tests
    // =========================================================================

    #[test]
    fn grid_1080p_three_by_three() {
        let tiles = compute_grid_tiles(1920, 1080, GridSpec::new(3, 3)).unwrap();
        assert_eq!(tiles.len(), 9);
        for t in &tiles {
            assert_eq!((t.dw, t.dh), (640, 360));
        }
        let last = tiles[8];
        assert_eq!(last.sx, 1280.0);
        assert_eq!(last.sy, 720.0);
        assert_eq!(last.sw, 640.0);
        assert_eq!(last.sh, 360.0);
    }

    #[test]
    fn grid_is_row_major() {
        let tiles = compute_grid_tiles(400, 200, GridSpec::new(4, 2)).unwrap();
        // Second tile is row 0, col 1
        assert_eq!((tiles[1].sx, tiles[1].sy), (100.0, 0.0));
        // Fifth tile starts row 1
        assert_eq!((tiles[4].sx, tiles[4].sy), (0.0, 100.0));
    }

    #[test]
    fn grid_uneven_keeps_uniform_output_and_exact_source() {
        // 1000 / 3 = 333.33.. → every tile is 333 wide on output
        let tiles = compute_grid_tiles(1000, 701, GridSpec::new(3, 2)).unwrap();
        assert!(tiles.iter().all(|t| t.dw == 333 && t.dh == 350));
        assert!((tiles[2].sx - 2000.0 / 3.0).abs() < 1e-9);
        assert!((tiles[2].sw - 1000.0 / 3.0).abs() < 1e-9);
        assert!((tiles[3].sy - 350.5).abs() < 1e-9);
    }

    #[test]
    fn grid_floor_rounding_invariant_holds() {
        for (w, h) in [(1, 1), (7, 3), (1001, 999), (1920, 1080), (4032, 3024)] {
            for cols in 1..=6u32 {
                for rows in 1..=6u32 {
                    if w / cols == 0 || h / rows == 0 {
                        continue;
                    }
                    let tiles = compute_grid_tiles(w, h, GridSpec::new(cols, rows)).unwrap();
                    assert_eq!(tiles.len() as u32, cols * rows);
                    let (dw, dh) = (tiles[0].dw, tiles[0].dh);
                    assert!(tiles.iter().all(|t| t.dw == dw && t.dh == dh));
                    assert!(dw * cols <= w && w < dw * cols + cols);
                    assert!(dh * rows <= h && h < dh * rows + rows);
                }
            }
        }
    }

    #[test]
    fn grid_reassembly_fits_canvas() {
        let grid = GridSpec::new(4, 3);
        let tiles = compute_grid_tiles(1003, 757, grid).unwrap();
        let (dw, dh) = (tiles[0].dw, tiles[0].dh);
        for (i, t) in tiles.iter().enumerate() {
            let col = i as u32 % grid.cols;
            let row = i as u32 / grid.cols;
            assert!(col * dw + t.dw <= dw * grid.cols);
            assert!(row * dh + t.dh <= dh * grid.rows);
        }
        // Last source rect ends exactly on the image edge
        let last = tiles.last().unwrap();
        assert!((last.sx + last.sw - 1003.0).abs() < 1e-9);
        assert!((last.sy + last.sh - 757.0).abs() < 1e-9);
    }

    #[test]
    fn grid_finer_than_image_is_invalid() {
        let err = compute_grid_tiles(2, 100, GridSpec::new(3, 1)).unwrap_err();
        assert!(matches!(err, GeometryError::InvalidLayout(_)));
        assert!(compute_grid_tiles(100, 2, GridSpec::new(1, 3)).is_err());
    }

    #[test]
    fn grid_zero_columns_is_invalid() {
        assert!(compute_grid_tiles(100, 100, GridSpec::new(0, 2)).is_err());
        assert!(compute_grid_tiles(0, 100, GridSpec::new(1, 1)).is_err());
    }

    // =========================================================================
    // compute_crop_rect tests
    // =========================================================================

    fn no_zoom() -> CropTuning {
        CropTuning {
            zoom: 1.0,
            ..CropTuning::default()
        }
    }

    #[test]
    fn crop_square_on_landscape_is_centered() {
        let rect = compute_crop_rect(1000, 500, &CropSpec::centered(1.0), &no_zoom()).unwrap();
        assert_eq!((rect.dw, rect.dh), (500, 500));
        assert_eq!((rect.sx, rect.sy), (250.0, 0.0));
        assert_eq!((rect.sw, rect.sh), (500.0, 500.0));
    }

    #[test]
    fn crop_zoom_shrinks_window_and_stays_centered() {
        let rect =
            compute_crop_rect(1000, 500, &CropSpec::centered(1.0), &CropTuning::default()).unwrap();
        assert_eq!((rect.dw, rect.dh), (500, 500));
        let sw = 500.0 / 1.1;
        assert!((rect.sw - sw).abs() < 1e-9);
        // Window center equals image center
        assert!((rect.sx + rect.sw / 2.0 - 500.0).abs() < 1e-9);
        assert!((rect.sy + rect.sh / 2.0 - 250.0).abs() < 1e-9);
    }

    #[test]
    fn crop_pan_moves_window_without_resizing() {
        let tuning = CropTuning::default();
        let base = compute_crop_rect(1000, 500, &CropSpec::centered(1.0), &tuning).unwrap();
        let panned = compute_crop_rect(
            1000,
            500,
            &CropSpec {
                ratio: 1.0,
                pan_x: 10.0,
                pan_y: 0.0,
            },
            &tuning,
        )
        .unwrap();
        assert!(panned.sx > base.sx);
        // 10% of the sampling window, not of the output
        assert!((panned.sx - base.sx - base.sw * 0.1).abs() < 1e-9);
        assert_eq!((panned.dw, panned.dh), (base.dw, base.dh));
        assert_eq!((panned.sw, panned.sh), (base.sw, base.sh));
        assert_eq!(panned.sy, base.sy);
    }

    #[test]
    fn crop_portrait_ratio_on_landscape_uses_full_height() {
        let rect = compute_crop_rect(1600, 900, &CropSpec::centered(9.0 / 16.0), &no_zoom())
            .unwrap();
        assert_eq!(rect.dh, 900);
        assert_eq!(rect.dw, 506); // 900 * 9/16 = 506.25
    }

    #[test]
    fn crop_wide_ratio_on_portrait_uses_full_width() {
        let rect = compute_crop_rect(600, 800, &CropSpec::centered(2.0), &no_zoom()).unwrap();
        assert_eq!((rect.dw, rect.dh), (600, 300));
        assert_eq!(rect.sy, 250.0);
    }

    #[test]
    fn crop_rejects_non_positive_ratio() {
        let tuning = CropTuning::default();
        for ratio in [0.0, -1.0, f64::NAN] {
            let err = compute_crop_rect(100, 100, &CropSpec::centered(ratio), &tuning).unwrap_err();
            assert!(matches!(err, GeometryError::InvalidLayout(_)));
        }
    }

    #[test]
    fn crop_rejects_empty_image() {
        let tuning = CropTuning::default();
        assert!(compute_crop_rect(0, 100, &CropSpec::centered(1.0), &tuning).is_err());
    }

    // =========================================================================
    // Presets
    // =========================================================================

    #[test]
    fn grid_layouts_match_advertised_count() {
        for grid in GridType::ALL {
            for layout in grid.layouts() {
                assert_eq!(layout.tile_count(), grid.tile_count());
            }
        }
    }

    #[test]
    fn grid_layouts_are_static_and_landscape_first() {
        let layouts: Vec<&'static [GridSpec]> =
            GridType::ALL.into_iter().map(GridType::layouts).collect();
        assert_eq!(layouts[1], &[GridSpec::new(3, 2), GridSpec::new(2, 3)]);
        assert_eq!(layouts[4][0], GridSpec::new(4, 3));
        assert!(layouts.iter().all(|l| l[0].cols >= l[0].rows));
    }

    #[test]
    fn grid_type_from_count() {
        assert_eq!(GridType::try_from(12).unwrap(), GridType::G12);
        assert!(GridType::try_from(5).is_err());
    }

    #[test]
    fn grid_layout_index_out_of_range() {
        assert_eq!(GridType::G6.layout(1).unwrap(), GridSpec::new(2, 3));
        assert!(GridType::G9.layout(1).is_err());
    }

    #[test]
    fn aspect_ratio_lookup() {
        assert_eq!(aspect_ratio("16:9").unwrap().ratio, 16.0 / 9.0);
        assert!(aspect_ratio("5:7").is_none());
    }
}
