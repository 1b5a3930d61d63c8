//! Tool configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults are
//! overridden by whatever keys the user file sets; everything else keeps its
//! default.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [batch]
//! max_items = 20            # Items accepted per batch
//! timeout_secs = 0          # Per-item transform timeout (0 = none)
//!
//! [split]
//! grid = 9                  # Tile count: 4, 6, 8, 9 or 12
//! layout = 0                # Which layout for that count (0 = landscape)
//!
//! [crop]
//! ratio = "1:1"             # Aspect preset
//! zoom = 1.1                # Sampling window = fitted crop / zoom
//! drag_sensitivity = 0.2    # Pan percent per pixel dragged
//!
//! [enhance]
//! target_width = 3840       # Local upscaler output width
//!
//! [processing]
//! max_processes = 4         # Max parallel split workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{AspectRatio, CropTuning, GridSpec, GridType, aspect_ratio};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Tool configuration loaded from `config.toml`.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    /// Batch size and transform timeout.
    pub batch: BatchConfig,
    /// Default grid for splitting.
    pub split: SplitConfig,
    /// Crop ratio and presentation constants.
    pub crop: CropConfig,
    /// Local enhancement settings.
    pub enhance: EnhanceConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl ToolConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.max_items == 0 {
            return Err(ConfigError::Validation(
                "batch.max_items must be at least 1".into(),
            ));
        }
        self.split.grid_spec()?;
        self.crop.aspect()?;
        if !(self.crop.zoom.is_finite() && self.crop.zoom > 0.0) {
            return Err(ConfigError::Validation(
                "crop.zoom must be a positive number".into(),
            ));
        }
        if !self.crop.drag_sensitivity.is_finite() {
            return Err(ConfigError::Validation(
                "crop.drag_sensitivity must be finite".into(),
            ));
        }
        if self.enhance.target_width == 0 {
            return Err(ConfigError::Validation(
                "enhance.target_width must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Batch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    /// Maximum items per batch; extra inputs are dropped with a notice.
    pub max_items: usize,
    /// Seconds before a single transform is abandoned. `0` disables the timeout.
    pub timeout_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_items: crate::batch::DEFAULT_MAX_ITEMS,
            timeout_secs: 0,
        }
    }
}

impl BatchConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Grid selection for splitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SplitConfig {
    /// Advertised tile count.
    pub grid: GridType,
    /// Index into the layouts offered for `grid`.
    pub layout: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            grid: GridType::G9,
            layout: 0,
        }
    }
}

impl SplitConfig {
    pub fn grid_spec(&self) -> Result<GridSpec, ConfigError> {
        self.grid
            .layout(self.layout)
            .map_err(|e| ConfigError::Validation(format!("split: {e}")))
    }
}

/// Crop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CropConfig {
    /// Aspect preset label, e.g. `"4:5"`.
    pub ratio: String,
    pub zoom: f64,
    pub drag_sensitivity: f64,
}

impl Default for CropConfig {
    fn default() -> Self {
        let tuning = CropTuning::default();
        Self {
            ratio: "1:1".to_string(),
            zoom: tuning.zoom,
            drag_sensitivity: tuning.drag_sensitivity,
        }
    }
}

impl CropConfig {
    pub fn aspect(&self) -> Result<AspectRatio, ConfigError> {
        aspect_ratio(&self.ratio).ok_or_else(|| {
            ConfigError::Validation(format!("crop.ratio '{}' is not a known preset", self.ratio))
        })
    }

    pub fn tuning(&self) -> CropTuning {
        CropTuning {
            zoom: self.zoom,
            drag_sensitivity: self.drag_sensitivity,
        }
    }
}

/// Enhancement settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnhanceConfig {
    /// Width the local upscaler scales to.
    pub target_width: u32,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            target_width: crate::services::DEFAULT_TARGET_WIDTH,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel split workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(ToolConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ToolConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ToolConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from a file, falling back to stock defaults when it is absent.
pub fn load_config(path: &Path) -> Result<ToolConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Tilesmith Configuration
# =======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Batches
# ---------------------------------------------------------------------------
[batch]
# Maximum number of images accepted into one batch. Extra inputs are
# dropped and reported.
max_items = 20
# Seconds before a single enhancement/segmentation call is abandoned and
# the item marked failed. 0 disables the timeout.
timeout_secs = 0

# ---------------------------------------------------------------------------
# Grid splitting
# ---------------------------------------------------------------------------
[split]
# Number of tiles: 4, 6, 8, 9 or 12.
grid = 9
# Layout for that count. 0 is landscape (more columns), 1 is portrait
# (more rows) where both exist:
#   4 -> 2x2 | 6 -> 3x2, 2x3 | 8 -> 4x2, 2x4 | 9 -> 3x3 | 12 -> 4x3, 3x4
layout = 0

# ---------------------------------------------------------------------------
# Cropping
# ---------------------------------------------------------------------------
[crop]
# Aspect preset: 1:1, 4:5, 3:4, 4:3, 9:16, 16:9, 21:9, 2.35:1, 2:3, 3:2
ratio = "1:1"
# The sampled window is the largest fitting crop divided by zoom, which
# leaves room to pan.
zoom = 1.1
# Pan percent per pixel of drag.
drag_sensitivity = 0.2

# ---------------------------------------------------------------------------
# Enhancement
# ---------------------------------------------------------------------------
[enhance]
# Output width of the built-in upscaler. Wider inputs pass through.
target_width = 3840

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers used while sampling split tiles.
# Omit to use all CPU cores. Values above the core count are clamped.
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = ToolConfig::default();
        assert_eq!(config.batch.max_items, 20);
        assert_eq!(config.batch.timeout(), None);
        assert_eq!(config.split.grid, GridType::G9);
        assert_eq!(config.split.grid_spec().unwrap(), GridSpec::new(3, 3));
        assert_eq!(config.crop.ratio, "1:1");
        assert_eq!(config.crop.tuning(), CropTuning::default());
        assert_eq!(config.enhance.target_width, 3840);
        assert_eq!(config.processing.max_processes, None);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[split]
grid = 12
layout = 1
"#;
        let config: ToolConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.split.grid_spec().unwrap(), GridSpec::new(3, 4));
        // Default values preserved
        assert_eq!(config.crop.zoom, 1.1);
        assert_eq!(config.batch.max_items, 20);
    }

    #[test]
    fn timeout_enabled_when_positive() {
        let config: ToolConfig = toml::from_str("[batch]\ntimeout_secs = 30\n").unwrap();
        assert_eq!(config.batch.timeout(), Some(Duration::from_secs(30)));
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(config, ToolConfig::default());
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            r#"
[crop]
ratio = "16:9"
drag_sensitivity = 0.5
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.crop.aspect().unwrap().ratio, 16.0 / 9.0);
        assert_eq!(config.crop.drag_sensitivity, 0.5);
        assert_eq!(config.crop.zoom, 1.1);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[batch\nmax_items = ").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn unknown_key_rejected() {
        let result: Result<ToolConfig, _> = toml::from_str("[crop]\nzooom = 2.0\n");
        assert!(result.is_err());
    }

    #[test]
    fn unknown_section_rejected() {
        let result: Result<ToolConfig, _> = toml::from_str("[colors]\nbg = 1\n");
        assert!(result.is_err());
    }

    #[test]
    fn unsupported_grid_rejected() {
        let result: Result<ToolConfig, _> = toml::from_str("[split]\ngrid = 5\n");
        assert!(result.is_err());
    }

    // =========================================================================
    // validate
    // =========================================================================

    #[test]
    fn validate_default_config_passes() {
        ToolConfig::default().validate().unwrap();
    }

    #[test]
    fn validate_layout_out_of_range() {
        let mut config = ToolConfig::default();
        config.split.layout = 1; // 9 only has 3x3
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_unknown_ratio() {
        let mut config = ToolConfig::default();
        config.crop.ratio = "7:5".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_zoom_positive() {
        let mut config = ToolConfig::default();
        config.crop.zoom = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_max_items_non_zero() {
        let mut config = ToolConfig::default();
        config.batch.max_items = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn resolve_config_rejects_invalid_values() {
        let overlay: toml::Value = toml::from_str("[enhance]\ntarget_width = 0\n").unwrap();
        let result = resolve_config(stock_defaults_value(), Some(overlay));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    // =========================================================================
    // merge_toml
    // =========================================================================

    #[test]
    fn merge_toml_table_merge() {
        let base: toml::Value = toml::from_str("[crop]\nzoom = 1.1\nratio = \"1:1\"\n").unwrap();
        let overlay: toml::Value = toml::from_str("[crop]\nratio = \"4:5\"\n").unwrap();
        let merged = merge_toml(base, overlay);
        let crop = merged.get("crop").unwrap();
        assert_eq!(crop.get("ratio").unwrap().as_str(), Some("4:5"));
        assert_eq!(crop.get("zoom").unwrap().as_float(), Some(1.1));
    }

    #[test]
    fn merge_toml_scalar_override() {
        let merged = merge_toml(toml::Value::Integer(1), toml::Value::Integer(2));
        assert_eq!(merged.as_integer(), Some(2));
    }

    // =========================================================================
    // effective_threads
    // =========================================================================

    #[test]
    fn effective_threads_auto() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&ProcessingConfig::default()), cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    #[test]
    fn effective_threads_zero_means_one() {
        let config = ProcessingConfig {
            max_processes: Some(0),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    // =========================================================================
    // stock config
    // =========================================================================

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: ToolConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, ToolConfig::default());
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let value = stock_defaults_value();
        for section in ["batch", "split", "crop", "enhance", "processing"] {
            assert!(value.get(section).is_some(), "missing [{section}]");
        }
    }
}
