//! Configuration types for the seismic preparation pipeline.

pub mod steps;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::segy::{HeaderFields, DEFAULT_CROSSLINE_BYTE, DEFAULT_INLINE_BYTE};
use crate::processors::assembler::TileSpec;
use crate::processors::splitter::{PatchSpec, SliceStep, DEFAULT_PER_VAL};
use crate::processors::statistics::{TargetRange, DEFAULT_CLIP_WIDTH};

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Where the survey axes live in each trace header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegyConfig {
    /// 1-based byte position of the inline number
    #[serde(default = "default_inline_byte")]
    pub inline_byte: u16,

    /// 1-based byte position of the crossline number
    #[serde(default = "default_crossline_byte")]
    pub crossline_byte: u16,
}

fn default_inline_byte() -> u16 {
    DEFAULT_INLINE_BYTE
}

fn default_crossline_byte() -> u16 {
    DEFAULT_CROSSLINE_BYTE
}

impl Default for SegyConfig {
    fn default() -> Self {
        Self {
            inline_byte: default_inline_byte(),
            crossline_byte: default_crossline_byte(),
        }
    }
}

impl SegyConfig {
    pub fn header_fields(&self) -> Result<HeaderFields> {
        HeaderFields::new(self.inline_byte, self.crossline_byte)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Cube extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Prefix of every output file
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Tile edge length; unset writes the whole survey as one array
    #[serde(default)]
    pub cube_size: Option<usize>,

    /// Step between tile origins
    #[serde(default = "default_stride")]
    pub stride: usize,

    /// Also dump the fast/slow header table as CSV
    #[serde(default)]
    pub write_headers: bool,
}

fn default_prefix() -> String {
    "seismic".to_string()
}

fn default_stride() -> usize {
    128
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            cube_size: None,
            stride: default_stride(),
            write_headers: false,
        }
    }
}

impl ExtractionConfig {
    /// Tile layout, or `None` in single-array mode.
    pub fn tile_spec(&self) -> Result<Option<TileSpec>> {
        self.cube_size
            .map(|size| TileSpec::new(size, self.stride))
            .transpose()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Post-extraction normalization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationConfig {
    /// Run the normalization pass after extraction
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Clip width in standard deviations
    #[serde(default = "default_k")]
    pub k: f64,

    #[serde(default)]
    pub min_range: f64,

    #[serde(default = "default_max_range")]
    pub max_range: f64,

    /// Clip without rescaling
    #[serde(default)]
    pub clip_only: bool,

    /// Center the clip window on the stored mean instead of zero
    #[serde(default)]
    pub use_mean: bool,
}

fn default_true() -> bool {
    true
}

fn default_k() -> f64 {
    DEFAULT_CLIP_WIDTH
}

fn default_max_range() -> f64 {
    1.0
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            k: default_k(),
            min_range: 0.0,
            max_range: default_max_range(),
            clip_only: false,
            use_mean: false,
        }
    }
}

impl NormalizationConfig {
    pub fn target_range(&self) -> Result<TargetRange> {
        TargetRange::new(self.min_range, self.max_range)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Train/validation split settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of each axis reserved for validation
    #[serde(default = "default_per_val")]
    pub per_val: f64,

    #[serde(default)]
    pub slice_step: SliceStep,

    #[serde(default = "default_patch_size")]
    pub patch_size: usize,

    #[serde(default = "default_patch_stride")]
    pub patch_stride: usize,
}

fn default_per_val() -> f64 {
    DEFAULT_PER_VAL
}

fn default_patch_size() -> usize {
    99
}

fn default_patch_stride() -> usize {
    50
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            per_val: default_per_val(),
            slice_step: SliceStep::default(),
            patch_size: default_patch_size(),
            patch_stride: default_patch_stride(),
        }
    }
}

impl SplitConfig {
    pub fn patch_spec(&self) -> PatchSpec {
        PatchSpec {
            size: self.patch_size,
            stride: self.patch_stride,
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub segy: SegyConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub normalization: NormalizationConfig,

    #[serde(default)]
    pub split: SplitConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check constraints that span several fields.
    pub fn validate(&self) -> Result<()> {
        self.segy.header_fields()?;
        self.extraction.tile_spec()?;
        if self.extraction.prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("prefix must not be empty".to_string()));
        }

        let norm = &self.normalization;
        if !norm.k.is_finite() || norm.k == 0.0 {
            return Err(ConfigError::Invalid(format!(
                "k must be a non-zero finite number, got {}",
                norm.k
            )));
        }
        norm.target_range()?;

        let split = &self.split;
        if !(0.0..=1.0).contains(&split.per_val) {
            return Err(ConfigError::Invalid(format!(
                "per_val must be within [0, 1], got {}",
                split.per_val
            )));
        }
        if split.patch_size == 0 || split.patch_stride == 0 {
            return Err(ConfigError::Invalid(
                "patch size and stride must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
