//! Seismic survey preparation for machine learning.
//!
//! This crate provides tools for:
//! - Reading SEG-Y trace headers and resolving the survey's fast/slow axes
//! - Assembling traces into dense `.npy` cubes, whole or as strided tiles
//! - Clip-and-rescale normalization driven by the volume's standard deviation
//! - Train/validation manifests of sections and patches of a labeled volume
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use seismic_prep::core::HeaderFields;
//! use seismic_prep::processors::assembler::{extract_tiles, TileSpec};
//!
//! let spec = TileSpec::new(128, 64).unwrap();
//! let report = extract_tiles(
//!     Path::new("survey.segy"),
//!     Path::new("cubes"),
//!     "survey",
//!     HeaderFields::default(),
//!     spec,
//! )
//! .unwrap();
//! println!("{} tiles, stddev {}", report.files.len(), report.stddev());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{
    ExtractionConfig, NormalizationConfig, PipelineConfig, SegyConfig, SplitConfig,
};
pub use processors::geometry::{Geometry, Orientation};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
