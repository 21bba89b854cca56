//! Clip and rescale normalization of seismic cubes.
//!
//! Parameters are derived from a global standard deviation (and optionally a
//! mean) and a clip width `k` in standard-deviation units:
//! - **Variant A** (no mean): values are clipped to `[-k*stddev, +k*stddev]`.
//! - **Variant B** (with mean): values are clipped to
//!   `[mean - k*stddev, mean + k*stddev]`.
//!
//! Clipped values are then mapped linearly onto `[min_range, max_range]`.
//! Arithmetic is done in `f64`; cubes are stored as `f32`.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use ndarray::Array3;
use rayon::prelude::*;
use thiserror::Error;

use crate::core::readers::{self, ReadError};
use crate::core::writers::{self, WriteError};
use crate::processors::assembler;

/// Default clip width in standard deviations.
pub const DEFAULT_CLIP_WIDTH: f64 = 12.0;

/// Relative slack allowed on the range check before a value is rejected.
const RANGE_TOLERANCE: f64 = 1e-9;

/// Errors raised by the statistics engine.
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("standard deviation must not be zero")]
    ZeroStddev,

    #[error("clip width k must not be zero")]
    ZeroClipWidth,

    #[error("{name} must be finite, got {value}")]
    NonFinite { name: &'static str, value: f64 },

    #[error("target range [{min}, {max}] is empty")]
    InvalidRange { min: f64, max: f64 },

    #[error("cube has NaN value")]
    NanInCube,

    #[error("cannot normalize a NaN value")]
    NanValue,

    #[error("normalized value should be within [{min}, {max}], the value was {value}")]
    OutOfRange { value: f64, min: f64, max: f64 },

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("failed to list '{path}': {source}")]
    ListDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for statistics operations.
pub type Result<T> = std::result::Result<T, StatsError>;

/// Closed interval normalized values are mapped onto.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetRange {
    min: f64,
    max: f64,
}

impl TargetRange {
    pub fn new(min: f64, max: f64) -> Result<Self> {
        check_finite("min_range", min)?;
        check_finite("max_range", max)?;
        if min >= max {
            return Err(StatsError::InvalidRange { min, max });
        }
        Ok(Self { min, max })
    }

    #[inline]
    pub fn min(&self) -> f64 {
        self.min
    }

    #[inline]
    pub fn max(&self) -> f64 {
        self.max
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max - self.min
    }
}

impl Default for TargetRange {
    fn default() -> Self {
        Self { min: 0.0, max: 1.0 }
    }
}

/// Clip bounds and scale factor derived by [`compute_statistics`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationParams {
    pub min_clip: f64,
    pub max_clip: f64,
    pub scale: f64,
}

fn check_finite(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(StatsError::NonFinite { name, value })
    }
}

/// Derive clip bounds and the scale factor.
///
/// # Arguments
///
/// * `stddev` - Global standard deviation of the volume
/// * `mean` - Center of the clip window; `None` centers it on zero
/// * `range` - Target interval of the normalized values
/// * `k` - Clip width in standard deviations
///
/// # Errors
///
/// Fails when `stddev` or `k` is zero or any input is not finite.
pub fn compute_statistics(
    stddev: f64,
    mean: Option<f64>,
    range: TargetRange,
    k: f64,
) -> Result<NormalizationParams> {
    check_finite("stddev", stddev)?;
    check_finite("k", k)?;
    if stddev == 0.0 {
        return Err(StatsError::ZeroStddev);
    }
    if k == 0.0 {
        return Err(StatsError::ZeroClipWidth);
    }

    let center = match mean {
        Some(m) => {
            check_finite("mean", m)?;
            m
        }
        None => 0.0,
    };
    let half_width = (k * stddev).abs();
    let min_clip = center - half_width;
    let max_clip = center + half_width;

    Ok(NormalizationParams {
        min_clip,
        max_clip,
        scale: range.width() / (max_clip - min_clip),
    })
}

/// Clamp `v` into `[min_clip, max_clip]`.
#[inline]
pub fn clip_value(v: f64, min_clip: f64, max_clip: f64) -> f64 {
    if v > max_clip {
        max_clip
    } else if v < min_clip {
        min_clip
    } else {
        v
    }
}

/// Clip `v`, then map it affinely onto `[min_range, max_range]`.
///
/// The result is checked against the target range. Drift of at most
/// `1e-9 * (max_range - min_range)` is snapped onto the bound; anything
/// further out means the parameters are inconsistent and is an error.
pub fn norm_value(
    v: f64,
    min_clip: f64,
    max_clip: f64,
    min_range: f64,
    max_range: f64,
    scale: f64,
) -> Result<f64> {
    if v.is_nan() {
        return Err(StatsError::NanValue);
    }
    let clipped = clip_value(v, min_clip, max_clip);
    let n = (clipped - min_clip) * scale + min_range;

    let tolerance = RANGE_TOLERANCE * (max_range - min_range).abs();
    if !(n >= min_range - tolerance && n <= max_range + tolerance) {
        return Err(StatsError::OutOfRange {
            value: n,
            min: min_range,
            max: max_range,
        });
    }
    Ok(n.max(min_range).min(max_range))
}

/// Next `f32` towards negative infinity.
fn next_below(x: f32) -> f32 {
    if x == 0.0 {
        -f32::from_bits(1)
    } else if x > 0.0 {
        f32::from_bits(x.to_bits() - 1)
    } else {
        f32::from_bits(x.to_bits() + 1)
    }
}

/// Largest `f32` that is not above `v`.
fn f32_at_most(v: f64) -> f32 {
    let x = v as f32;
    if (x as f64) <= v {
        x
    } else {
        next_below(x)
    }
}

/// Smallest `f32` that is not below `v`.
fn f32_at_least(v: f64) -> f32 {
    -f32_at_most(-v)
}

/// Normalize every element of `cube`, preserving its shape.
///
/// Stored values never leave the target range, even when its bounds are
/// not exactly representable in `f32`.
pub fn normalize_cube(
    cube: &Array3<f32>,
    params: &NormalizationParams,
    range: TargetRange,
) -> Result<Array3<f32>> {
    let lo = f32_at_least(range.min);
    let hi = f32_at_most(range.max);
    let mut out = Array3::<f32>::zeros(cube.raw_dim());
    for (dst, &v) in out.iter_mut().zip(cube.iter()) {
        let n = norm_value(
            v as f64,
            params.min_clip,
            params.max_clip,
            range.min,
            range.max,
            params.scale,
        )?;
        *dst = (n as f32).max(lo).min(hi);
    }
    Ok(out)
}

/// Clip every element of `cube` without rescaling.
pub fn clip_cube(cube: &Array3<f32>, params: &NormalizationParams) -> Array3<f32> {
    cube.mapv(|v| clip_value(v as f64, params.min_clip, params.max_clip) as f32)
}

/// Validate `cube` and the parameters, then clip or fully normalize it.
///
/// With `normalize == false` only the clipped cube is returned.
pub fn process_cube(
    cube: &Array3<f32>,
    stddev: f64,
    mean: Option<f64>,
    k: f64,
    range: TargetRange,
    normalize: bool,
) -> Result<Array3<f32>> {
    if cube.iter().any(|v| v.is_nan()) {
        return Err(StatsError::NanInCube);
    }
    if stddev == 0.0 {
        return Err(StatsError::ZeroStddev);
    }
    if k == 0.0 {
        return Err(StatsError::ZeroClipWidth);
    }

    let params = compute_statistics(stddev, mean, range, k)?;
    debug!(
        "clip [{}, {}], scale {}",
        params.min_clip, params.max_clip, params.scale
    );

    if normalize {
        normalize_cube(cube, &params, range)
    } else {
        Ok(clip_cube(cube, &params))
    }
}

/// Everything needed to normalize stored blocks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizeSettings {
    pub stddev: f64,
    pub mean: Option<f64>,
    pub k: f64,
    pub range: TargetRange,
    /// `false` clips without rescaling.
    pub normalize: bool,
}

impl NormalizeSettings {
    pub fn new(stddev: f64, mean: Option<f64>) -> Self {
        Self {
            stddev,
            mean,
            k: DEFAULT_CLIP_WIDTH,
            range: TargetRange::default(),
            normalize: true,
        }
    }

    /// Settings built from a statistics side file.
    pub fn from_stats_file(path: &Path) -> Result<Self> {
        let stored = readers::read_stats_file(path)?;
        Ok(Self::new(stored.stddev, stored.mean))
    }
}

/// What happened to one block file.
#[derive(Debug)]
pub enum NormalizeOutcome {
    /// The file now holds the processed cube.
    Normalized,
    /// Processing was rejected; the original file is untouched.
    Failed(StatsError),
}

impl NormalizeOutcome {
    pub fn is_normalized(&self) -> bool {
        matches!(self, NormalizeOutcome::Normalized)
    }
}

/// Normalize the cube stored at `path` and overwrite it.
///
/// Data problems (NaN, zero stddev, out-of-range values) are returned as
/// [`NormalizeOutcome::Failed`] so batches can continue. Unreadable or
/// unwritable files are errors.
pub fn normalize_file(path: &Path, settings: &NormalizeSettings) -> Result<NormalizeOutcome> {
    let cube = readers::read_cube(path)?;

    let processed = match process_cube(
        &cube,
        settings.stddev,
        settings.mean,
        settings.k,
        settings.range,
        settings.normalize,
    ) {
        Ok(processed) => processed,
        Err(e) => {
            warn!("Not possible to normalize {}: {}", path.display(), e);
            return Ok(NormalizeOutcome::Failed(e));
        }
    };

    writers::replace_cube(path, &processed)?;
    debug!("normalized {}", path.display());
    Ok(NormalizeOutcome::Normalized)
}

/// Result of a batch normalization.
#[derive(Debug, Default)]
pub struct NormalizationSummary {
    pub normalized: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, StatsError)>,
}

impl NormalizationSummary {
    pub fn total(&self) -> usize {
        self.normalized.len() + self.failed.len()
    }
}

/// Normalize every file in `paths` independently, in parallel.
///
/// The summary keeps the order of `paths`. The first I/O error aborts the
/// batch.
pub fn normalize_files(paths: &[PathBuf], settings: &NormalizeSettings) -> Result<NormalizationSummary> {
    let outcomes: Vec<(PathBuf, NormalizeOutcome)> = paths
        .par_iter()
        .map(|path| normalize_file(path, settings).map(|outcome| (path.clone(), outcome)))
        .collect::<Result<_>>()?;

    let mut summary = NormalizationSummary::default();
    for (path, outcome) in outcomes {
        match outcome {
            NormalizeOutcome::Normalized => summary.normalized.push(path),
            NormalizeOutcome::Failed(e) => summary.failed.push((path, e)),
        }
    }

    info!(
        "Normalized {} of {} blocks",
        summary.normalized.len(),
        summary.total()
    );
    Ok(summary)
}

/// Extraction blocks for `prefix` directly inside `dir`, sorted by name.
///
/// Only `<prefix>.npy` and `<prefix>_<fast>_<slow>_<depth>.npy` qualify, so
/// stitched columns and other arrays in the directory are left alone.
pub fn find_blocks(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let list_err = |source| StatsError::ListDirectory {
        path: dir.to_path_buf(),
        source,
    };
    let single = assembler::single_file_name(prefix);

    let mut blocks = Vec::new();
    for entry in fs::read_dir(dir).map_err(list_err)? {
        let path = entry.map_err(list_err)?.path();
        let is_block = path.file_name().and_then(|n| n.to_str()).map_or(false, |name| {
            name == single || assembler::parse_tile_file_name(prefix, name).is_some()
        });
        if is_block && path.is_file() {
            blocks.push(path);
        }
    }
    blocks.sort();
    Ok(blocks)
}

/// Normalize every `prefix` block in `dir`.
pub fn normalize_directory(
    dir: &Path,
    prefix: &str,
    settings: &NormalizeSettings,
) -> Result<NormalizationSummary> {
    let blocks = find_blocks(dir, prefix)?;
    info!("Normalizing {} blocks in {}", blocks.len(), dir.display());
    normalize_files(&blocks, settings)
}
