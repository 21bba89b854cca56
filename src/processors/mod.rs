//! Data processing modules.

pub mod assembler;
pub mod convert;
pub mod geometry;
pub mod splitter;
pub mod statistics;

// Re-export key types for convenience
pub use assembler::{
    extract_single_array, extract_tiles, stitch_column, survey_metadata, tile_origins,
    AssemblyError, ExtractionReport, RunningStats, SurveyMetadata, TileSpec,
};
pub use convert::{run_conversion, ConversionReport};
pub use geometry::{
    identify_fast_direction, resolve_geometry, AxisIndexSet, Geometry, GeometryError,
    Orientation, TraceHeaderTable,
};
pub use splitter::{
    aline_range, split_patch_train_val, split_patches, split_section_train_val, split_sections,
    PatchSpec, SliceStep, SplitError, SplitManifest,
};
pub use statistics::{
    clip_cube, clip_value, compute_statistics, norm_value, normalize_cube, normalize_directory,
    normalize_file, process_cube, NormalizationParams, NormalizeOutcome, NormalizeSettings,
    StatsError, TargetRange,
};
