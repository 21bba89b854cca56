//! Data writers for cube blocks, statistics side files and manifests.
//!
//! This module provides functions for persisting pipeline outputs:
//! - NumPy `.npy` cube blocks (whole-file replace)
//! - The plain-text statistics side file (`<prefix>.txt`)
//! - Plain-text split manifests, one entry per line
//! - CSV dumps of the canonical trace-header table

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use ndarray::Array3;
use ndarray_npy::WriteNpyExt;
use thiserror::Error;

use crate::processors::geometry::TraceHeaderTable;

/// Extension of the statistics side file.
pub const STATS_EXTENSION: &str = "txt";

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// NumPy serialization error.
    #[error("NPY write error for '{path}': {source}")]
    NpyError {
        path: String,
        #[source]
        source: ndarray_npy::WriteNpyError,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// Failed to move a temporary file over its destination.
    #[error("failed to replace '{path}': {source}")]
    Replace {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
pub(crate) fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered writer for the given path.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

/// Path of the statistics side file for `prefix` inside `output_dir`.
pub fn stats_path(output_dir: &Path, prefix: &str) -> PathBuf {
    output_dir.join(format!("{prefix}.{STATS_EXTENSION}"))
}

/// Write a 3D cube to a `.npy` file.
///
/// The array is serialized in memory first and written with a single call,
/// so a file on disk is either the previous content or the complete new one
/// (barring a crash mid-write).
///
/// # Errors
///
/// Returns an error if:
/// - Parent directories cannot be created
/// - File cannot be created or written to
pub fn write_cube(path: &Path, cube: &Array3<f32>) -> Result<()> {
    ensure_parent_dirs(path)?;

    let mut buffer = Vec::with_capacity(cube.len() * 4 + 128);
    cube.write_npy(&mut buffer).map_err(|e| WriteError::NpyError {
        path: path.display().to_string(),
        source: e,
    })?;

    fs::write(path, buffer).map_err(|e| WriteError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })
}

/// Replace `path` with `cube` by writing a sibling temporary file and
/// renaming it over the original.
pub fn replace_cube(path: &Path, cube: &Array3<f32>) -> Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    write_cube(&tmp, cube)?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        WriteError::Replace {
            path: path.display().to_string(),
            source: e,
        }
    })
}

/// Write the statistics side file: standard deviation on the first line,
/// mean on the second.
pub fn write_stats_file(path: &Path, stddev: f64, mean: f64) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut writer = create_buffered_writer(path)?;
    let path_str = path.display().to_string();

    writeln!(writer, "{stddev}")
        .and_then(|_| writeln!(writer, "{mean}"))
        .and_then(|_| writer.flush())
        .map_err(|e| WriteError::WriteFile {
            path: path_str,
            source: e,
        })
}

/// Write manifest entries, one per line.
pub fn write_manifest(path: &Path, entries: &[String]) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut writer = create_buffered_writer(path)?;
    let path_str = path.display().to_string();

    for entry in entries {
        writeln!(writer, "{entry}").map_err(|e| WriteError::WriteFile {
            path: path_str.clone(),
            source: e,
        })?;
    }

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })
}

/// Write the canonical trace-header table to CSV with `fast,slow` columns,
/// one row per trace in file order.
pub fn write_trace_table_csv(path: &Path, table: &TraceHeaderTable) -> Result<()> {
    ensure_parent_dirs(path)?;
    let writer = create_buffered_writer(path)?;
    let path_str = path.display().to_string();
    let csv_err = |e| WriteError::CsvError {
        path: path_str.clone(),
        source: e,
    };

    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(["fast", "slow"]).map_err(csv_err)?;
    for (fast, slow) in table.iter() {
        csv_writer
            .write_record([fast.to_string(), slow.to_string()])
            .map_err(csv_err)?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str.clone(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::readers::{read_cube, read_stats_file};
    use ndarray::Array3;
    use tempfile::tempdir;

    fn create_test_cube() -> Array3<f32> {
        Array3::from_shape_fn((2, 3, 4), |(i, j, k)| (i * 100 + j * 10 + k) as f32)
    }

    #[test]
    fn test_write_cube_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cube.npy");
        let cube = create_test_cube();

        write_cube(&path, &cube).unwrap();

        let loaded = read_cube(&path).unwrap();
        assert_eq!(loaded, cube);
    }

    #[test]
    fn test_write_cube_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("subdir").join("nested").join("cube.npy");

        write_cube(&path, &create_test_cube()).unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_replace_cube_leaves_no_temporary() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cube.npy");
        write_cube(&path, &create_test_cube()).unwrap();

        let replacement = Array3::from_elem((1, 1, 1), 7.0f32);
        replace_cube(&path, &replacement).unwrap();

        assert_eq!(read_cube(&path).unwrap(), replacement);
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["cube.npy".to_string()]);
    }

    #[test]
    fn test_stats_file_lines() {
        let dir = tempdir().unwrap();
        let path = stats_path(dir.path(), "volume");
        assert!(path.ends_with("volume.txt"));

        write_stats_file(&path, 11.557824, -0.25).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["11.557824", "-0.25"]);

        let stats = read_stats_file(&path).unwrap();
        assert_eq!(stats.stddev, 11.557824);
        assert_eq!(stats.mean, Some(-0.25));
    }

    #[test]
    fn test_write_manifest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("splits").join("section_train.txt");
        let entries = vec!["i_0".to_string(), "x_12".to_string()];

        write_manifest(&path, &entries).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "i_0\nx_12\n");
    }

    #[test]
    fn test_write_trace_table_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("headers.csv");
        let table = TraceHeaderTable::new(vec![10, 10, 11], vec![100, 101, 100]);

        write_trace_table_csv(&path, &table).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["fast,slow", "10,100", "10,101", "11,100"]);
    }
}
