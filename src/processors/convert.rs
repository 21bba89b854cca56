//! End-to-end SEG-Y conversion job.
//!
//! Resolves the survey geometry, writes the cube blocks and the statistics
//! side file, then optionally normalizes every block that was written.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};

use crate::config::PipelineConfig;
use crate::core::{readers, writers};
use crate::processors::assembler::{self, ExtractionReport, SurveyMetadata};
use crate::processors::statistics::{self, NormalizationSummary, NormalizeSettings};

/// Everything a conversion run produced.
#[derive(Debug)]
pub struct ConversionReport {
    pub metadata: SurveyMetadata,
    /// CSV dump of the fast/slow header table, when requested.
    pub headers_csv: Option<PathBuf>,
    /// `None` in metadata-only mode.
    pub extraction: Option<ExtractionReport>,
    /// `None` when normalization is disabled or nothing was extracted.
    pub normalization: Option<NormalizationSummary>,
}

impl ConversionReport {
    /// Whether any written block was left unnormalized.
    pub fn has_failures(&self) -> bool {
        self.normalization
            .as_ref()
            .map_or(false, |summary| !summary.failed.is_empty())
    }
}

fn log_metadata(metadata: &SurveyMetadata) {
    let g = &metadata.geometry;
    let first_five = |v: &[i32]| v.iter().take(5).copied().collect::<Vec<_>>();

    info!(
        "Fast lines: {} to {} ({} lines)",
        g.fast.min().unwrap_or_default(),
        g.fast.max().unwrap_or_default(),
        g.fast.len()
    );
    info!(
        "Slow lines: {} to {} ({} lines)",
        g.slow.min().unwrap_or_default(),
        g.slow.max().unwrap_or_default(),
        g.slow.len()
    );
    info!("Sample size: {}", metadata.samples_per_trace);
    info!("Trace count: {}", metadata.trace_count());
    info!("First five distinct fast line indexes: {:?}", first_five(g.fast.values()));
    info!("First five distinct slow line indexes: {:?}", first_five(g.slow.values()));
}

/// Normalization settings for the blocks of one extraction run.
fn settings_for(stats_path: &Path, config: &PipelineConfig) -> Result<NormalizeSettings> {
    let stored = readers::read_stats_file(stats_path)
        .with_context(|| format!("Std deviation file could not be read: {}", stats_path.display()))?;
    let norm = &config.normalization;

    Ok(NormalizeSettings {
        stddev: stored.stddev,
        mean: if norm.use_mean { stored.mean } else { None },
        k: norm.k,
        range: norm.target_range()?,
        normalize: !norm.clip_only,
    })
}

/// Convert the SEG-Y file at `input` into `.npy` blocks inside `output_dir`.
///
/// # Arguments
///
/// * `input` - SEG-Y survey file
/// * `output_dir` - Directory receiving blocks, side file and manifests
/// * `config` - Header positions, tiling and normalization settings
/// * `metadata_only` - Only resolve and report the geometry
pub fn run_conversion(
    input: &Path,
    output_dir: &Path,
    config: &PipelineConfig,
    metadata_only: bool,
) -> Result<ConversionReport> {
    config.validate().context("Invalid configuration")?;
    let fields = config.segy.header_fields()?;
    let prefix = config.extraction.prefix.as_str();

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    let metadata = assembler::survey_metadata(input, fields)
        .with_context(|| format!("Failed to read SEG-Y metadata: {}", input.display()))?;
    log_metadata(&metadata);

    let headers_csv = if config.extraction.write_headers {
        let path = output_dir.join(format!("{prefix}_headers.csv"));
        writers::write_trace_table_csv(&path, &metadata.geometry.headers)?;
        Some(path)
    } else {
        None
    };

    if metadata_only {
        return Ok(ConversionReport {
            metadata,
            headers_csv,
            extraction: None,
            normalization: None,
        });
    }

    let extraction = match config.extraction.tile_spec()? {
        None => assembler::extract_single_array(input, output_dir, prefix, fields),
        Some(spec) => assembler::extract_tiles(input, output_dir, prefix, fields, spec),
    }
    .with_context(|| format!("Failed to convert {}", input.display()))?;

    if extraction.duplicates > 0 {
        warn!("{} duplicate trace locations were overwritten", extraction.duplicates);
    }

    let normalization = if config.normalization.enabled {
        info!("Normalizing and clipping {} blocks", extraction.files.len());
        let settings = settings_for(&extraction.stats_path, config)?;
        let summary = statistics::normalize_files(&extraction.files, &settings)
            .context("Normalization pass failed")?;
        for (path, err) in &summary.failed {
            warn!("Block left unnormalized: {}: {}", path.display(), err);
        }
        Some(summary)
    } else {
        None
    };

    Ok(ConversionReport {
        metadata,
        headers_csv,
        extraction: Some(extraction),
        normalization,
    })
}
