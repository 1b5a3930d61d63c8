//! Parameter types for image operations.
//!
//! These structs describe *how finely* to do something, not *what* to do.
//! The geometry module decides which rectangles to sample; these values tune
//! the sampler and the crop window.
//!
//! ## Types
//!
//! - [`Smoothing`]: Interpolation policy handed to the sampler.
//! - [`CropTuning`]: Crop magnification and drag sensitivity constants.

use serde::{Deserialize, Serialize};

/// Interpolation policy for resampling.
///
/// Source rectangles are routinely fractional, so callers ask for
/// [`Smoothing::High`] unless they explicitly want hard pixel edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Smoothing {
    /// Area-weighted averaging when shrinking, bilinear when enlarging.
    #[default]
    High,
    /// Nearest source pixel.
    Off,
}

/// Presentation constants for the crop workflow.
///
/// - `zoom`: the sampling window is the fitted crop divided by this factor,
///   leaving margin for panning.
/// - `drag_sensitivity`: pan percent per pixel of pointer drag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropTuning {
    pub zoom: f64,
    pub drag_sensitivity: f64,
}

impl Default for CropTuning {
    fn default() -> Self {
        Self {
            zoom: 1.1,
            drag_sensitivity: 0.2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoothing_defaults_to_high() {
        assert_eq!(Smoothing::default(), Smoothing::High);
    }

    #[test]
    fn crop_tuning_defaults() {
        let t = CropTuning::default();
        assert_eq!(t.zoom, 1.1);
        assert_eq!(t.drag_sensitivity, 0.2);
    }
}
