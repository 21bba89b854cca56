//! Command-line interface for the seismic preparation pipeline.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{self, steps::PipelineDefinition};
use crate::core::{writers, HeaderFields};
use crate::processors::splitter::{self, SliceStep};
use crate::processors::{assembler, convert, statistics};
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "seismic-prep")]
#[command(about = "SEG-Y to cube conversion, normalization and split manifests", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report the survey geometry of a SEG-Y file
    Metadata {
        /// SEG-Y file
        input: PathBuf,
        /// Byte position of the inline number
        #[arg(long)]
        iline: Option<u16>,
        /// Byte position of the crossline number
        #[arg(long)]
        xline: Option<u16>,
        /// Write the fast/slow header table to this CSV file
        #[arg(long)]
        headers_csv: Option<PathBuf>,
    },

    /// Convert a SEG-Y file into .npy cubes
    Convert {
        /// SEG-Y file
        input: PathBuf,
        /// Output directory for blocks and the statistics file
        output_dir: PathBuf,
        /// Prefix of the output files
        #[arg(short, long)]
        prefix: Option<String>,
        #[arg(long)]
        iline: Option<u16>,
        #[arg(long)]
        xline: Option<u16>,
        /// Tile edge length (omit for a single array)
        #[arg(long)]
        cube_size: Option<usize>,
        /// Step between tile origins
        #[arg(long)]
        stride: Option<usize>,
        /// Only resolve and report the geometry
        #[arg(long)]
        metadata_only: bool,
        /// Do not normalize the written blocks
        #[arg(long)]
        skip_normalize: bool,
        /// Clip without rescaling
        #[arg(long)]
        clip_only: bool,
        /// Clip width in standard deviations
        #[arg(short, long)]
        k: Option<f64>,
    },

    /// Normalize every .npy block in a directory in place
    Normalize {
        /// Directory containing the blocks
        directory: PathBuf,
        /// Statistics file (defaults to <directory>/<prefix>.txt)
        #[arg(long)]
        stats: Option<PathBuf>,
        #[arg(short, long)]
        prefix: Option<String>,
        #[arg(short, long)]
        k: Option<f64>,
        #[arg(long)]
        min_range: Option<f64>,
        #[arg(long)]
        max_range: Option<f64>,
        /// Clip without rescaling
        #[arg(long)]
        clip_only: bool,
        /// Center the clip window on the stored mean
        #[arg(long)]
        use_mean: bool,
    },

    /// Write section train/val manifests for a labeled volume
    SplitSections {
        /// Labeled volume (.npy)
        label_file: PathBuf,
        output_dir: PathBuf,
        /// Fraction of each axis used for validation
        #[arg(long)]
        per_val: Option<f64>,
        /// Keep every n-th section
        #[arg(long)]
        slice_step: Option<SliceStep>,
    },

    /// Write patch train/val manifests for a labeled volume
    SplitPatches {
        /// Labeled volume (.npy)
        label_file: PathBuf,
        output_dir: PathBuf,
        #[arg(long)]
        per_val: Option<f64>,
        #[arg(long)]
        slice_step: Option<SliceStep>,
        /// Patch edge length
        #[arg(long)]
        patch_size: Option<usize>,
        /// Step between patch origins
        #[arg(long)]
        patch_stride: Option<usize>,
    },

    /// Concatenate a vertical column of tiles by depth
    Stitch {
        /// Directory containing the tiles
        directory: PathBuf,
        prefix: String,
        /// Fast-axis origin of the column
        fast: usize,
        /// Slow-axis origin of the column
        slow: usize,
        /// Output .npy file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a pipeline step definition (JSON or YAML)
    CheckPipeline {
        definition: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("...{}", tail(value, 36))
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

/// Last `n` characters of `s`; paths are more telling at their end.
fn tail(s: &str, n: usize) -> &str {
    let skip = s.chars().count().saturating_sub(n);
    s.char_indices().nth(skip).map_or(s, |(i, _)| &s[i..])
}

fn fail(spinner: Option<&ProgressBar>, what: &str, err: impl std::fmt::Display) -> ! {
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    error!("{} failed: {:#}", what, err);
    std::process::exit(1);
}

fn header_fields(config: &PipelineConfig, iline: Option<u16>, xline: Option<u16>) -> HeaderFields {
    let inline_byte = iline.unwrap_or(config.segy.inline_byte);
    let crossline_byte = xline.unwrap_or(config.segy.crossline_byte);
    match HeaderFields::new(inline_byte, crossline_byte) {
        Ok(fields) => fields,
        Err(e) => fail(None, "Header configuration", e),
    }
}

/// Configuration from `path`, or the defaults when no file was given.
///
/// A file that was given but cannot be loaded is an error.
fn load_config(path: Option<&Path>) -> config::Result<PipelineConfig> {
    match path {
        Some(path) => {
            let cfg = PipelineConfig::from_yaml(path)?;
            info!("Loaded config from: {}", path.display());
            Ok(cfg)
        }
        None => Ok(PipelineConfig::default()),
    }
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    let config = match load_config(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => fail(None, "Loading config", e),
    };

    match cli.command {
        Commands::Metadata { input, iline, xline, headers_csv } => {
            cmd_metadata(&input, iline, xline, headers_csv.as_deref(), &config);
        }
        Commands::Convert {
            input,
            output_dir,
            prefix,
            iline,
            xline,
            cube_size,
            stride,
            metadata_only,
            skip_normalize,
            clip_only,
            k,
        } => {
            let mut config = config;
            if let Some(prefix) = prefix {
                config.extraction.prefix = prefix;
            }
            config.segy.inline_byte = iline.unwrap_or(config.segy.inline_byte);
            config.segy.crossline_byte = xline.unwrap_or(config.segy.crossline_byte);
            if cube_size.is_some() {
                config.extraction.cube_size = cube_size;
            }
            config.extraction.stride = stride.unwrap_or(config.extraction.stride);
            config.normalization.enabled &= !skip_normalize;
            config.normalization.clip_only |= clip_only;
            config.normalization.k = k.unwrap_or(config.normalization.k);
            cmd_convert(&input, &output_dir, metadata_only, &config);
        }
        Commands::Normalize {
            directory,
            stats,
            prefix,
            k,
            min_range,
            max_range,
            clip_only,
            use_mean,
        } => {
            let mut config = config;
            if let Some(prefix) = prefix {
                config.extraction.prefix = prefix;
            }
            let norm = &mut config.normalization;
            norm.k = k.unwrap_or(norm.k);
            norm.min_range = min_range.unwrap_or(norm.min_range);
            norm.max_range = max_range.unwrap_or(norm.max_range);
            norm.clip_only |= clip_only;
            norm.use_mean |= use_mean;
            cmd_normalize(&directory, stats, &config);
        }
        Commands::SplitSections { label_file, output_dir, per_val, slice_step } => {
            let per_val = per_val.unwrap_or(config.split.per_val);
            let step = slice_step.unwrap_or(config.split.slice_step);
            cmd_split_sections(&label_file, &output_dir, per_val, step);
        }
        Commands::SplitPatches {
            label_file,
            output_dir,
            per_val,
            slice_step,
            patch_size,
            patch_stride,
        } => {
            let mut split = config.split.clone();
            split.per_val = per_val.unwrap_or(split.per_val);
            split.slice_step = slice_step.unwrap_or(split.slice_step);
            split.patch_size = patch_size.unwrap_or(split.patch_size);
            split.patch_stride = patch_stride.unwrap_or(split.patch_stride);
            cmd_split_patches(&label_file, &output_dir, &split);
        }
        Commands::Stitch { directory, prefix, fast, slow, output } => {
            cmd_stitch(&directory, &prefix, fast, slow, output);
        }
        Commands::CheckPipeline { definition } => {
            cmd_check_pipeline(&definition);
        }
    }
}

fn cmd_metadata(
    input: &Path,
    iline: Option<u16>,
    xline: Option<u16>,
    headers_csv: Option<&Path>,
    config: &PipelineConfig,
) {
    let start = Instant::now();
    let fields = header_fields(config, iline, xline);

    let spinner = create_spinner("Reading trace headers...");
    let metadata = match assembler::survey_metadata(input, fields) {
        Ok(m) => m,
        Err(e) => fail(Some(&spinner), "Metadata extraction", e),
    };

    if let Some(path) = headers_csv {
        spinner.set_message("Writing header table...");
        if let Err(e) = writers::write_trace_table_csv(path, &metadata.geometry.headers) {
            fail(Some(&spinner), "Header table export", e);
        }
    }
    spinner.finish_and_clear();

    let g = &metadata.geometry;
    let axis = |set: &crate::processors::geometry::AxisIndexSet| {
        format!(
            "{} to {} ({} lines)",
            set.min().unwrap_or_default(),
            set.max().unwrap_or_default(),
            set.len()
        )
    };
    print_summary(
        "SEG-Y Metadata",
        &[
            ("Input file", input.display().to_string()),
            ("Orientation", format!("{:?}", g.orientation)),
            ("Fast lines", axis(&g.fast)),
            ("Slow lines", axis(&g.slow)),
            ("Sample size", metadata.samples_per_trace.to_string()),
            ("Trace count", metadata.trace_count().to_string()),
            (
                "Header table",
                headers_csv.map_or("-".to_string(), |p| p.display().to_string()),
            ),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_convert(input: &Path, output_dir: &Path, metadata_only: bool, config: &PipelineConfig) {
    let start = Instant::now();

    println!("Converting SEG-Y file...");
    println!("Input: {}", input.display());
    println!("Output directory: {}", output_dir.display());

    let spinner = create_spinner("Extracting cubes...");
    let report = match convert::run_conversion(input, output_dir, config, metadata_only) {
        Ok(r) => r,
        Err(e) => fail(Some(&spinner), "Conversion", e),
    };
    spinner.finish_and_clear();

    let mut items = vec![
        ("Input file", input.display().to_string()),
        ("Volume shape", format!("{:?}", report.metadata.cube_shape())),
        ("Trace count", report.metadata.trace_count().to_string()),
    ];
    if let Some(extraction) = &report.extraction {
        items.push(("Blocks written", extraction.files.len().to_string()));
        items.push(("Std deviation", format!("{:.6}", extraction.stddev())));
        items.push(("Mean", format!("{:.6}", extraction.mean())));
        items.push(("Empty traces", extraction.holes.to_string()));
    }
    if let Some(summary) = &report.normalization {
        items.push(("Normalized", summary.normalized.len().to_string()));
        items.push(("Failed", summary.failed.len().to_string()));
    }
    items.push(("Duration", format!("{:.2?}", start.elapsed())));

    print_summary(
        if metadata_only { "Metadata Complete" } else { "Conversion Complete" },
        &items,
    );

    if report.has_failures() {
        std::process::exit(1);
    }
}

fn cmd_normalize(directory: &Path, stats: Option<PathBuf>, config: &PipelineConfig) {
    let start = Instant::now();
    let stats_path =
        stats.unwrap_or_else(|| writers::stats_path(directory, &config.extraction.prefix));

    let norm = &config.normalization;
    let range = match norm.target_range() {
        Ok(r) => r,
        Err(e) => fail(None, "Normalization", e),
    };
    let mut settings = match statistics::NormalizeSettings::from_stats_file(&stats_path) {
        Ok(s) => s,
        Err(e) => fail(None, "Reading statistics", e),
    };
    if !norm.use_mean {
        settings.mean = None;
    }
    settings.k = norm.k;
    settings.range = range;
    settings.normalize = !norm.clip_only;

    let spinner = create_spinner("Normalizing blocks...");
    let summary = match statistics::normalize_directory(directory, &config.extraction.prefix, &settings) {
        Ok(s) => s,
        Err(e) => fail(Some(&spinner), "Normalization", e),
    };
    spinner.finish_and_clear();

    for (path, err) in &summary.failed {
        warn!("Not normalized: {}: {}", path.display(), err);
    }

    print_summary(
        "Normalization Complete",
        &[
            ("Directory", directory.display().to_string()),
            ("Std deviation", settings.stddev.to_string()),
            ("k", settings.k.to_string()),
            ("Range", format!("[{}, {}]", range.min(), range.max())),
            ("Normalized", summary.normalized.len().to_string()),
            ("Failed", summary.failed.len().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    if !summary.failed.is_empty() {
        std::process::exit(1);
    }
}

fn cmd_split_sections(label_file: &Path, output_dir: &Path, per_val: f64, step: SliceStep) {
    let start = Instant::now();

    let files = match splitter::split_section_train_val(label_file, output_dir, per_val, step) {
        Ok(f) => f,
        Err(e) => fail(None, "Section split", e),
    };

    print_summary(
        "Section Split Complete",
        &[
            ("Label file", label_file.display().to_string()),
            ("Train", files.train.display().to_string()),
            ("Validation", files.val.display().to_string()),
            ("Validation fraction", per_val.to_string()),
            ("Slice step", step.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_split_patches(label_file: &Path, output_dir: &Path, split: &crate::config::SplitConfig) {
    let start = Instant::now();

    let files = match splitter::split_patch_train_val(
        label_file,
        output_dir,
        split.per_val,
        split.slice_step,
        split.patch_spec(),
    ) {
        Ok(f) => f,
        Err(e) => fail(None, "Patch split", e),
    };

    print_summary(
        "Patch Split Complete",
        &[
            ("Label file", label_file.display().to_string()),
            ("Train", files.train.display().to_string()),
            ("Validation", files.val.display().to_string()),
            ("Patch size", split.patch_size.to_string()),
            ("Patch stride", split.patch_stride.to_string()),
            ("Slice step", split.slice_step.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_stitch(directory: &Path, prefix: &str, fast: usize, slow: usize, output: Option<PathBuf>) {
    let start = Instant::now();
    let output = output.unwrap_or_else(|| {
        directory.join(format!("{prefix}_{fast:05}_{slow:05}_column.npy"))
    });

    let spinner = create_spinner("Stitching tile column...");
    let column = match assembler::stitch_column(directory, prefix, fast, slow) {
        Ok(c) => c,
        Err(e) => fail(Some(&spinner), "Stitching", e),
    };
    if let Err(e) = writers::write_cube(&output, &column) {
        fail(Some(&spinner), "Writing column", e);
    }
    spinner.finish_and_clear();

    print_summary(
        "Stitch Complete",
        &[
            ("Column", format!("({fast}, {slow})")),
            ("Shape", format!("{:?}", column.dim())),
            ("Output file", output.display().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_check_pipeline(definition: &Path) {
    let pipeline = match PipelineDefinition::from_path(definition) {
        Ok(p) => p,
        Err(e) => fail(None, "Pipeline check", e),
    };

    let steps: Vec<String> = pipeline
        .steps
        .iter()
        .map(|(key, step)| format!("{key}={}", step.kind()))
        .collect();

    print_summary(
        "Pipeline Definition Valid",
        &[
            ("Definition", definition.display().to_string()),
            ("Steps", pipeline.len().to_string()),
            ("Kinds", steps.join(", ")),
        ],
    );
}
