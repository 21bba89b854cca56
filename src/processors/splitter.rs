//! Train/validation manifests for labeled volumes.
//!
//! A labeled volume of shape `(inline, crossline, depth)` is addressed either
//! by whole sections (`i_<n>`, `x_<n>`) or by patches inside a section
//! (`i_<i>_<j>_<k>`, `x_<i>_<j>_<k>`). Sections along each axis are sampled
//! every `step` indices; the leading `floor(count * per_val)` indices form the
//! validation split.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::readers::{self, ReadError};
use crate::core::writers::{self, WriteError};
use crate::processors::assembler::tile_origins;

/// Default fraction of each axis reserved for validation.
pub const DEFAULT_PER_VAL: f64 = 0.2;

/// Errors raised while splitting a volume.
#[derive(Debug, Error)]
pub enum SplitError {
    #[error("slice step must not be zero")]
    ZeroStep,

    #[error("slice step cannot be a negative number, got {0}")]
    NegativeStep(f64),

    #[error("slice step must be an integer, got {0}")]
    FractionalStep(f64),

    #[error("slice step '{0}' is not a number")]
    InvalidStep(String),

    #[error("validation fraction must be within [0, 1], got {0}")]
    InvalidFraction(f64),

    #[error("patch size and stride must be positive (size {size}, stride {stride})")]
    InvalidPatch { size: usize, stride: usize },

    #[error("no {size}x{size} patch fits a volume of shape {shape:?}")]
    PatchTooLarge { size: usize, shape: [usize; 3] },

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Result type for split operations.
pub type Result<T> = std::result::Result<T, SplitError>;

/// Validated positive integer step between sampled sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "u64")]
pub struct SliceStep(usize);

impl SliceStep {
    pub fn new(step: usize) -> Result<Self> {
        if step == 0 {
            Err(SplitError::ZeroStep)
        } else {
            Ok(Self(step))
        }
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for SliceStep {
    fn default() -> Self {
        Self(1)
    }
}

impl TryFrom<f64> for SliceStep {
    type Error = SplitError;

    fn try_from(value: f64) -> Result<Self> {
        if value.is_nan() {
            return Err(SplitError::InvalidStep(value.to_string()));
        }
        if value < 0.0 {
            return Err(SplitError::NegativeStep(value));
        }
        if value.fract() != 0.0 || !value.is_finite() {
            return Err(SplitError::FractionalStep(value));
        }
        Self::new(value as usize)
    }
}

impl FromStr for SliceStep {
    type Err = SplitError;

    fn from_str(s: &str) -> Result<Self> {
        let value: f64 = s
            .trim()
            .parse()
            .map_err(|_| SplitError::InvalidStep(s.to_string()))?;
        Self::try_from(value)
    }
}

impl From<SliceStep> for u64 {
    fn from(step: SliceStep) -> Self {
        step.0 as u64
    }
}

impl fmt::Display for SliceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sampled indices of one axis, split into train and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlineRange {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
}

fn check_fraction(per_val: f64) -> Result<()> {
    if (0.0..=1.0).contains(&per_val) {
        Ok(())
    } else {
        Err(SplitError::InvalidFraction(per_val))
    }
}

/// Split `0..count` sampled every `step` into train and validation.
///
/// Indices below `floor(count * per_val)` are validation, the rest train.
pub fn aline_range(count: usize, per_val: f64, step: SliceStep) -> Result<AlineRange> {
    check_fraction(per_val)?;
    let boundary = ((count as f64) * per_val).floor() as usize;

    let (val, train): (Vec<usize>, Vec<usize>) = (0..count)
        .step_by(step.get())
        .partition(|&idx| idx < boundary);
    Ok(AlineRange { train, val })
}

/// Which manifest family is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitKind {
    Section,
    Patch,
}

impl SplitKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SplitKind::Section => "section",
            SplitKind::Patch => "patch",
        }
    }
}

/// Train and validation manifest entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitManifest {
    pub train: Vec<String>,
    pub val: Vec<String>,
}

impl SplitManifest {
    /// Train entries followed by validation entries.
    pub fn train_val(&self) -> Vec<String> {
        self.train.iter().chain(self.val.iter()).cloned().collect()
    }
}

/// Section manifests for a volume of `shape`.
pub fn split_sections(shape: [usize; 3], per_val: f64, step: SliceStep) -> Result<SplitManifest> {
    let inlines = aline_range(shape[0], per_val, step)?;
    let crosslines = aline_range(shape[1], per_val, step)?;

    let entries = |prefix: &str, idx: &[usize]| -> Vec<String> {
        idx.iter().map(|i| format!("{prefix}_{i}")).collect()
    };

    let mut manifest = SplitManifest::default();
    manifest.train.extend(entries("i", &inlines.train));
    manifest.train.extend(entries("x", &crosslines.train));
    manifest.val.extend(entries("i", &inlines.val));
    manifest.val.extend(entries("x", &crosslines.val));
    Ok(manifest)
}

/// Size and origin step of square patches inside a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchSpec {
    pub size: usize,
    pub stride: usize,
}

/// Patch manifests for a volume of `shape`.
///
/// Every sampled inline section contributes one `i_<i>_<j>_<k>` entry per
/// complete patch over (crossline, depth); crossline sections contribute
/// `x_<i>_<j>_<k>` entries over (inline, depth).
pub fn split_patches(
    shape: [usize; 3],
    per_val: f64,
    step: SliceStep,
    patch: PatchSpec,
) -> Result<SplitManifest> {
    if patch.size == 0 || patch.stride == 0 {
        return Err(SplitError::InvalidPatch {
            size: patch.size,
            stride: patch.stride,
        });
    }

    let [n_inline, n_crossline, n_depth] = shape;
    let inline_origins = tile_origins(n_inline, patch.size, patch.stride);
    let crossline_origins = tile_origins(n_crossline, patch.size, patch.stride);
    let depth_origins = tile_origins(n_depth, patch.size, patch.stride);
    if depth_origins.is_empty() || (inline_origins.is_empty() && crossline_origins.is_empty()) {
        return Err(SplitError::PatchTooLarge {
            size: patch.size,
            shape,
        });
    }

    let inlines = aline_range(n_inline, per_val, step)?;
    let crosslines = aline_range(n_crossline, per_val, step)?;

    let inline_patches = |sections: &[usize]| -> Vec<String> {
        let mut out = Vec::new();
        for &i in sections {
            for &j in &crossline_origins {
                for &k in &depth_origins {
                    out.push(format!("i_{i}_{j}_{k}"));
                }
            }
        }
        out
    };
    let crossline_patches = |sections: &[usize]| -> Vec<String> {
        let mut out = Vec::new();
        for &j in sections {
            for &i in &inline_origins {
                for &k in &depth_origins {
                    out.push(format!("x_{i}_{j}_{k}"));
                }
            }
        }
        out
    };

    let mut manifest = SplitManifest::default();
    manifest.train.extend(inline_patches(&inlines.train));
    manifest.train.extend(crossline_patches(&crosslines.train));
    manifest.val.extend(inline_patches(&inlines.val));
    manifest.val.extend(crossline_patches(&crosslines.val));
    Ok(manifest)
}

/// Paths of the three manifest files of one split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitFiles {
    pub train: PathBuf,
    pub val: PathBuf,
    pub train_val: PathBuf,
}

/// Write `<kind>_train.txt`, `<kind>_val.txt` and `<kind>_train_val.txt`.
pub fn write_split_files(
    output_dir: &Path,
    kind: SplitKind,
    manifest: &SplitManifest,
) -> Result<SplitFiles> {
    let name = |suffix: &str| output_dir.join(format!("{}_{}.txt", kind.as_str(), suffix));
    let files = SplitFiles {
        train: name("train"),
        val: name("val"),
        train_val: name("train_val"),
    };

    writers::write_manifest(&files.train, &manifest.train)?;
    writers::write_manifest(&files.val, &manifest.val)?;
    writers::write_manifest(&files.train_val, &manifest.train_val())?;

    info!(
        "{} split: {} train, {} val -> {}",
        kind.as_str(),
        manifest.train.len(),
        manifest.val.len(),
        output_dir.display()
    );
    Ok(files)
}

/// Split the sections of the labeled volume stored in `label_file`.
pub fn split_section_train_val(
    label_file: &Path,
    output_dir: &Path,
    per_val: f64,
    step: SliceStep,
) -> Result<SplitFiles> {
    let shape = readers::read_volume_shape(label_file)?;
    let manifest = split_sections(shape, per_val, step)?;
    write_split_files(output_dir, SplitKind::Section, &manifest)
}

/// Split the patches of the labeled volume stored in `label_file`.
pub fn split_patch_train_val(
    label_file: &Path,
    output_dir: &Path,
    per_val: f64,
    step: SliceStep,
    patch: PatchSpec,
) -> Result<SplitFiles> {
    let shape = readers::read_volume_shape(label_file)?;
    let manifest = split_patches(shape, per_val, step, patch)?;
    write_split_files(output_dir, SplitKind::Patch, &manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use ndarray_npy::write_npy;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::tempdir;

    const ALINE: usize = 100;
    const PER_VAL: f64 = 0.2;

    fn step(n: usize) -> SliceStep {
        SliceStep::new(n).unwrap()
    }

    fn read_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Split an entry into its axis tag and numeric fields.
    fn fields(entry: &str) -> (String, Vec<usize>) {
        let mut parts = entry.split('_');
        let tag = parts.next().unwrap().to_string();
        (tag, parts.map(|p| p.parse().unwrap()).collect())
    }

    #[test]
    fn test_aline_range_step_one() {
        let range = aline_range(ALINE, PER_VAL, step(1)).unwrap();
        assert_eq!(range.val.len(), 20);
        assert_eq!(range.train.len(), 80);
        assert_eq!(range.val, (0..20).collect::<Vec<_>>());
        assert_eq!(range.train[0], 20);
    }

    #[test]
    fn test_aline_range_double_digit_step() {
        let range = aline_range(ALINE, PER_VAL, step(17)).unwrap();
        assert_eq!(range.val, vec![0, 17]);
        assert_eq!(range.train, vec![34, 51, 68, 85]);
    }

    #[test]
    fn test_aline_range_fraction_bounds() {
        let all_train = aline_range(10, 0.0, step(1)).unwrap();
        assert!(all_train.val.is_empty());
        let all_val = aline_range(10, 1.0, step(1)).unwrap();
        assert!(all_val.train.is_empty());
        assert!(matches!(
            aline_range(10, 1.5, step(1)),
            Err(SplitError::InvalidFraction(_))
        ));
    }

    #[test]
    fn test_slice_step_validation() {
        assert!(matches!(SliceStep::new(0), Err(SplitError::ZeroStep)));
        assert!(matches!(SliceStep::try_from(0.0), Err(SplitError::ZeroStep)));
        assert!(matches!(
            SliceStep::try_from(-1.0),
            Err(SplitError::NegativeStep(_))
        ));
        assert!(matches!(
            SliceStep::try_from(1.1),
            Err(SplitError::FractionalStep(_))
        ));
        assert_eq!(SliceStep::try_from(17.0).unwrap().get(), 17);
        assert_eq!("2".parse::<SliceStep>().unwrap().get(), 2);
        assert!(matches!(
            "two".parse::<SliceStep>(),
            Err(SplitError::InvalidStep(_))
        ));
    }

    #[test]
    fn test_slice_step_deserializes_through_validation() {
        let ok: SliceStep = serde_yaml::from_str("3").unwrap();
        assert_eq!(ok.get(), 3);
        assert!(serde_yaml::from_str::<SliceStep>("0").is_err());
        assert!(serde_yaml::from_str::<SliceStep>("-2").is_err());
        assert!(serde_yaml::from_str::<SliceStep>("1.5").is_err());
        assert_eq!(serde_yaml::to_string(&ok).unwrap().trim(), "3");
    }

    #[test]
    fn test_sections_partition_without_overlap() {
        let manifest = split_sections([ALINE, ALINE, ALINE], PER_VAL, step(1)).unwrap();
        assert_eq!(manifest.train.len(), 160);
        assert_eq!(manifest.val.len(), 40);

        let train: HashSet<_> = manifest.train.iter().collect();
        assert!(manifest.val.iter().all(|e| !train.contains(e)));
        assert_eq!(manifest.train_val().len(), 200);
        assert!(manifest.train.contains(&"i_20".to_string()));
        assert!(manifest.val.contains(&"x_19".to_string()));
    }

    #[test]
    fn test_section_files_step_two() {
        let dir = tempdir().unwrap();
        let label_file = dir.path().join("label_file.npy");
        write_npy(&label_file, &Array3::<f64>::zeros((ALINE, ALINE, ALINE))).unwrap();
        let output = dir.path().join("split");

        let files = split_section_train_val(&label_file, &output, PER_VAL, step(2)).unwrap();
        assert_eq!(files.train, output.join("section_train.txt"));

        let train = read_lines(&files.train);
        let val = read_lines(&files.val);
        assert_eq!(train.len(), 80);
        assert_eq!(val.len(), 20);
        for entry in train.iter().chain(val.iter()) {
            let (_, idx) = fields(entry);
            assert_eq!(idx[0] % 2, 0, "{entry}");
        }
        assert_eq!(read_lines(&files.train_val).len(), 100);
    }

    #[test]
    fn test_patch_files_step_one() {
        let dir = tempdir().unwrap();
        let label_file = dir.path().join("label_file.npy");
        write_npy(&label_file, &Array3::<u8>::zeros((ALINE, ALINE, ALINE))).unwrap();
        let output = dir.path().join("split");
        let patch = PatchSpec {
            size: 100,
            stride: 50,
        };

        let files = split_patch_train_val(&label_file, &output, PER_VAL, step(1), patch).unwrap();
        let train = read_lines(&files.train);
        assert_eq!(train.len(), 160);
        assert_eq!(read_lines(&files.val).len(), 40);
        assert!(train.contains(&"i_20_0_0".to_string()));
        assert!(train.contains(&"x_0_99_0".to_string()));
    }

    #[test]
    fn test_patches_step_two_on_split_axes() {
        let patch = PatchSpec { size: 4, stride: 4 };
        let manifest = split_patches([10, 12, 20], PER_VAL, step(2), patch).unwrap();

        for entry in manifest.train.iter().chain(manifest.val.iter()) {
            let (tag, idx) = fields(entry);
            assert_eq!(idx.len(), 3);
            match tag.as_str() {
                "i" => assert_eq!(idx[0] % 2, 0, "{entry}"),
                "x" => assert_eq!(idx[1] % 2, 0, "{entry}"),
                other => panic!("unexpected axis tag {other}"),
            }
        }

        // Inline 0 is validation: 3 crossline origins x 5 depth origins.
        let first_inline: Vec<_> = manifest
            .val
            .iter()
            .filter(|e| e.starts_with("i_0_"))
            .collect();
        assert_eq!(first_inline.len(), 15);
    }

    #[test]
    fn test_patch_validation() {
        let zero = PatchSpec { size: 0, stride: 1 };
        assert!(matches!(
            split_patches([10, 10, 10], PER_VAL, step(1), zero),
            Err(SplitError::InvalidPatch { .. })
        ));
        let huge = PatchSpec {
            size: 64,
            stride: 64,
        };
        assert!(matches!(
            split_patches([10, 10, 10], PER_VAL, step(1), huge),
            Err(SplitError::PatchTooLarge { .. })
        ));
    }
}
