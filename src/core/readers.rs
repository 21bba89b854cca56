//! Loaders for persisted pipeline artifacts.
//!
//! - `.npy` cube blocks written by the assembler
//! - The statistics side file (`<prefix>.txt`)
//! - Shapes of labeled volumes stored with any common NumPy dtype

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use ndarray::Array3;
use ndarray_npy::{read_npy, ReadNpyError};
use regex::Regex;
use thiserror::Error;

/// Errors that can occur while loading artifacts.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("NPY read error for '{path}': {source}")]
    Npy {
        path: PathBuf,
        #[source]
        source: ReadNpyError,
    },

    #[error("NPY header of '{path}' is not valid: {reason}")]
    InvalidHeader { path: PathBuf, reason: String },

    #[error("unsupported dtype in '{0}': expected a numeric 3D array")]
    UnsupportedDtype(PathBuf),

    #[error("statistics file '{path}' is not valid: {reason}")]
    InvalidStats { path: PathBuf, reason: String },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, ReadError>;

/// Contents of a statistics side file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoredStatistics {
    pub stddev: f64,
    /// Absent in files that only carry the standard deviation.
    pub mean: Option<f64>,
}

fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ReadError::NotFound(path.to_path_buf()))
    }
}

/// Load a `float32` cube from a `.npy` file.
pub fn read_cube(path: &Path) -> Result<Array3<f32>> {
    require_file(path)?;
    read_npy(path).map_err(|source| ReadError::Npy {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the statistics side file.
///
/// The first non-empty line holds the standard deviation; an optional second
/// line holds the mean.
pub fn read_stats_file(path: &Path) -> Result<StoredStatistics> {
    require_file(path)?;
    let content = fs::read_to_string(path)?;
    let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());

    let invalid = |reason: String| ReadError::InvalidStats {
        path: path.to_path_buf(),
        reason,
    };

    let stddev_str = lines
        .next()
        .ok_or_else(|| invalid("file is empty".to_string()))?;
    let stddev: f64 = stddev_str
        .parse()
        .map_err(|_| invalid(format!("stddev value not valid: {stddev_str}")))?;

    let mean = match lines.next() {
        Some(mean_str) => Some(
            mean_str
                .parse()
                .map_err(|_| invalid(format!("mean value not valid: {mean_str}")))?,
        ),
        None => None,
    };

    Ok(StoredStatistics { stddev, mean })
}

const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Raw text of the header dictionary of a `.npy` file.
fn read_npy_header(path: &Path) -> Result<String> {
    let invalid = |reason: String| ReadError::InvalidHeader {
        path: path.to_path_buf(),
        reason,
    };

    let mut file = BufReader::new(File::open(path)?);
    let mut preamble = [0u8; 8];
    file.read_exact(&mut preamble)?;
    if &preamble[..6] != NPY_MAGIC {
        return Err(invalid("missing NPY magic string".to_string()));
    }

    let len = match preamble[6] {
        1 => {
            let mut buf = [0u8; 2];
            file.read_exact(&mut buf)?;
            u16::from_le_bytes(buf) as usize
        }
        2 | 3 => {
            let mut buf = [0u8; 4];
            file.read_exact(&mut buf)?;
            u32::from_le_bytes(buf) as usize
        }
        v => return Err(invalid(format!("unsupported format version {v}"))),
    };

    let mut header = vec![0u8; len];
    file.read_exact(&mut header)?;
    String::from_utf8(header).map_err(|_| invalid("header is not text".to_string()))
}

/// Shape of a 3D `.npy` volume regardless of its numeric dtype.
///
/// Only the header is parsed; the array data is never decoded.
pub fn read_volume_shape(path: &Path) -> Result<[usize; 3]> {
    require_file(path)?;
    let header = read_npy_header(path)?;
    let invalid = |reason: String| ReadError::InvalidHeader {
        path: path.to_path_buf(),
        reason,
    };

    let descr = Regex::new(r"'descr'\s*:\s*'[<>|=]?([a-zA-Z])\d*'")
        .map_err(|e| invalid(e.to_string()))?;
    let kind = descr
        .captures(&header)
        .and_then(|c| c.get(1))
        .ok_or_else(|| invalid("no descr entry".to_string()))?;
    if !matches!(kind.as_str(), "f" | "i" | "u") {
        return Err(ReadError::UnsupportedDtype(path.to_path_buf()));
    }

    let shape = Regex::new(r"'shape'\s*:\s*\(([^)]*)\)").map_err(|e| invalid(e.to_string()))?;
    let dims = shape
        .captures(&header)
        .and_then(|c| c.get(1))
        .ok_or_else(|| invalid("no shape entry".to_string()))?;
    let dims = dims
        .as_str()
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| d.parse::<usize>().map_err(|_| invalid(format!("bad dimension: {d}"))))
        .collect::<Result<Vec<_>>>()?;

    match dims[..] {
        [a, b, c] => Ok([a, b, c]),
        _ => Err(ReadError::UnsupportedDtype(path.to_path_buf())),
    }
}
