//! Core data types and I/O operations.

pub mod readers;
pub mod segy;
pub mod writers;

pub use readers::{read_cube, read_stats_file, read_volume_shape, ReadError, StoredStatistics};
pub use segy::{HeaderFields, SegyError, SegyFile, SegyLayout, SegyWriter};
pub use writers::{replace_cube, stats_path, write_cube, write_manifest, write_stats_file, WriteError};
