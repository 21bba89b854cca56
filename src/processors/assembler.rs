//! Cube assembly from SEG-Y traces.
//!
//! Two output modes are supported:
//! - **Single array**: the whole survey as one `(fast, slow, depth)` block.
//! - **Tiled**: fixed-size sub-cubes cut with a stride along every axis.
//!   Windows that would run past an axis bound are dropped, never padded.
//!
//! Both modes record the mean and standard deviation of every source sample
//! placed into the volume and persist them next to the blocks as
//! `<prefix>.txt`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use ndarray::{s, Array3, ArrayView1, Axis};
use regex::Regex;
use thiserror::Error;

use crate::core::readers::{self, ReadError};
use crate::core::segy::{HeaderFields, SegyError, SegyFile};
use crate::core::writers::{self, WriteError};
use crate::processors::geometry::{self, Geometry, GeometryError};

/// Errors that can occur while assembling cubes.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error(transparent)]
    Segy(#[from] SegyError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("invalid tile specification: {0}")]
    InvalidTileSpec(String),

    #[error("no complete {size}^3 tile fits a volume of shape {shape:?}")]
    NoCompleteTiles { shape: [usize; 3], size: usize },

    #[error("trace {index} at ({fast}, {slow}) is outside the resolved geometry")]
    UnplacedTrace { index: usize, fast: i32, slow: i32 },

    #[error("no tiles found for column ({fast}, {slow}) with prefix '{prefix}' in {dir}")]
    EmptyColumn {
        prefix: String,
        fast: usize,
        slow: usize,
        dir: PathBuf,
    },

    #[error("cannot stitch column: {0}")]
    Stitch(#[from] ndarray::ShapeError),

    #[error("tile '{path}' has shape {found:?}, expected {expected:?} in the first two axes")]
    ColumnShapeMismatch {
        path: PathBuf,
        found: [usize; 3],
        expected: [usize; 2],
    },
}

/// Result type for assembly operations.
pub type Result<T> = std::result::Result<T, AssemblyError>;

/// Streaming mean/variance accumulator (Welford).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single observation.
    #[inline]
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Add every sample of a trace.
    pub fn extend(&mut self, samples: &[f32]) {
        for &v in samples {
            self.push(v as f64);
        }
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.count
    }

    #[inline]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population variance; zero before any observation.
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Cube edge length and origin step for tiled extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSpec {
    size: usize,
    stride: usize,
}

impl TileSpec {
    /// `stride == size` gives disjoint tiles, `stride < size` overlapping ones.
    pub fn new(size: usize, stride: usize) -> Result<Self> {
        if size == 0 {
            return Err(AssemblyError::InvalidTileSpec(
                "cube size must be positive".to_string(),
            ));
        }
        if stride == 0 {
            return Err(AssemblyError::InvalidTileSpec(
                "stride must be positive".to_string(),
            ));
        }
        if stride > size {
            return Err(AssemblyError::InvalidTileSpec(format!(
                "stride {stride} exceeds cube size {size}"
            )));
        }
        Ok(Self { size, stride })
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }
}

/// Origins of every complete window of `size` along an axis of `len`.
///
/// Yields `floor((len - size) / stride) + 1` origins, or none when the axis
/// is shorter than one window.
pub fn tile_origins(len: usize, size: usize, stride: usize) -> Vec<usize> {
    if size == 0 || stride == 0 || size > len {
        return Vec::new();
    }
    (0..=len - size).step_by(stride).collect()
}

/// File name of the tile whose origin is `origin` (fast, slow, depth).
///
/// Origins are zero-padded so lexical order matches depth order inside a
/// column.
pub fn tile_file_name(prefix: &str, origin: [usize; 3]) -> String {
    format!(
        "{}_{:05}_{:05}_{:05}.npy",
        prefix, origin[0], origin[1], origin[2]
    )
}

/// Recover the origin encoded in a tile file name.
pub fn parse_tile_file_name(prefix: &str, file_name: &str) -> Option<[usize; 3]> {
    let pattern = format!(r"^{}_(\d+)_(\d+)_(\d+)\.npy$", regex::escape(prefix));
    let re = Regex::new(&pattern).ok()?;
    let captures = re.captures(file_name)?;
    let mut origin = [0usize; 3];
    for (slot, group) in origin.iter_mut().zip(1..=3) {
        *slot = captures.get(group)?.as_str().parse().ok()?;
    }
    Some(origin)
}

/// File name of the single-array block.
pub fn single_file_name(prefix: &str) -> String {
    format!("{prefix}.npy")
}

/// Headers and layout of a survey, without any samples.
#[derive(Debug, Clone)]
pub struct SurveyMetadata {
    pub geometry: Geometry,
    pub samples_per_trace: usize,
}

impl SurveyMetadata {
    pub fn trace_count(&self) -> usize {
        self.geometry.trace_count()
    }

    /// Shape of the dense single-array cube.
    pub fn cube_shape(&self) -> [usize; 3] {
        [
            self.geometry.fast.len(),
            self.geometry.slow.len(),
            self.samples_per_trace,
        ]
    }
}

/// Read the trace headers of an open file and resolve its geometry.
pub fn read_metadata(segy: &mut SegyFile, fields: HeaderFields) -> Result<SurveyMetadata> {
    let pairs = segy.read_header_pairs(fields)?;
    let geometry = geometry::resolve_geometry(&pairs)?;
    debug!(
        "{}: {} traces, orientation {:?}",
        segy.path().display(),
        pairs.len(),
        geometry.orientation
    );
    Ok(SurveyMetadata {
        geometry,
        samples_per_trace: segy.samples_per_trace(),
    })
}

/// Open `path` and resolve its survey metadata.
pub fn survey_metadata(path: &Path, fields: HeaderFields) -> Result<SurveyMetadata> {
    let mut segy = SegyFile::open(path)?;
    read_metadata(&mut segy, fields)
}

/// A dense survey volume and the statistics of the samples placed into it.
#[derive(Debug, Clone)]
pub struct AssembledVolume {
    pub cube: Array3<f32>,
    pub stats: RunningStats,
    /// Traces whose coordinate had already been filled.
    pub duplicates: usize,
    /// Cells left zero because no trace maps onto them.
    pub holes: usize,
}

/// Place every trace of `segy` into a `(fast, slow, depth)` cube.
///
/// Traces are positioned by the rank of their header values within each
/// axis, counted along the direction the file numbers that axis in, so for a
/// complete survey in file order trace `s + f * slow_count` lands at `(f, s)`.
/// A repeated coordinate keeps the later trace.
pub fn assemble_volume(segy: &mut SegyFile, metadata: &SurveyMetadata) -> Result<AssembledVolume> {
    let [fast_count, slow_count, depth] = metadata.cube_shape();
    let fast_pos = metadata.geometry.fast.positions();
    let slow_pos = metadata.geometry.slow.positions();
    let headers = &metadata.geometry.headers;

    let mut cube = Array3::<f32>::zeros((fast_count, slow_count, depth));
    let mut filled = vec![false; fast_count * slow_count];
    let mut stats = RunningStats::new();
    let mut duplicates = 0usize;

    for (index, (trace, (fast, slow))) in segy.traces()?.zip(headers.iter()).enumerate() {
        let trace = trace?;
        let (f, s) = match (fast_pos.get(&fast), slow_pos.get(&slow)) {
            (Some(&f), Some(&s)) => (f, s),
            _ => return Err(AssemblyError::UnplacedTrace { index, fast, slow }),
        };

        let cell = f * slow_count + s;
        if filled[cell] {
            duplicates += 1;
        }
        filled[cell] = true;

        cube.slice_mut(s![f, s, ..])
            .assign(&ArrayView1::from(trace.as_slice()));
    }

    // Overwritten duplicates do not count towards the statistics.
    for cell in filled.iter().enumerate().filter_map(|(c, &done)| done.then_some(c)) {
        for &v in cube.slice(s![cell / slow_count, cell % slow_count, ..]) {
            stats.push(v as f64);
        }
    }

    let holes = filled.iter().filter(|&&f| !f).count();
    if duplicates > 0 {
        warn!(
            "{}: {} traces repeat an earlier coordinate and overwrote it",
            segy.path().display(),
            duplicates
        );
    }
    if holes > 0 {
        debug!("{}: {} empty trace locations zero-filled", segy.path().display(), holes);
    }

    Ok(AssembledVolume {
        cube,
        stats,
        duplicates,
        holes,
    })
}

/// Cut `cube` into every complete tile described by `spec`.
///
/// Tiles are returned in (fast, slow, depth) origin order.
pub fn split_into_tiles(cube: &Array3<f32>, spec: TileSpec) -> Result<Vec<([usize; 3], Array3<f32>)>> {
    let (nf, ns, nd) = cube.dim();
    let n = spec.size();
    let fast = tile_origins(nf, n, spec.stride());
    let slow = tile_origins(ns, n, spec.stride());
    let depth = tile_origins(nd, n, spec.stride());

    if fast.is_empty() || slow.is_empty() || depth.is_empty() {
        return Err(AssemblyError::NoCompleteTiles {
            shape: [nf, ns, nd],
            size: n,
        });
    }

    let mut tiles = Vec::with_capacity(fast.len() * slow.len() * depth.len());
    for &f in &fast {
        for &s in &slow {
            for &d in &depth {
                let tile = cube.slice(s![f..f + n, s..s + n, d..d + n]).to_owned();
                tiles.push(([f, s, d], tile));
            }
        }
    }
    Ok(tiles)
}

/// Summary of one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    /// Block files written, in origin order.
    pub files: Vec<PathBuf>,
    /// Shape of the full survey volume.
    pub volume_shape: [usize; 3],
    pub stats_path: PathBuf,
    pub stats: RunningStats,
    pub duplicates: usize,
    pub holes: usize,
}

impl ExtractionReport {
    pub fn stddev(&self) -> f64 {
        self.stats.stddev()
    }

    pub fn mean(&self) -> f64 {
        self.stats.mean()
    }
}

fn load_volume(input: &Path, fields: HeaderFields) -> Result<AssembledVolume> {
    let mut segy = SegyFile::open(input)?;
    let metadata = read_metadata(&mut segy, fields)?;
    info!(
        "Assembling {} traces into a {:?} volume",
        metadata.trace_count(),
        metadata.cube_shape()
    );
    assemble_volume(&mut segy, &metadata)
}

fn finish_report(
    output_dir: &Path,
    prefix: &str,
    files: Vec<PathBuf>,
    volume: &AssembledVolume,
) -> Result<ExtractionReport> {
    let stats_path = writers::stats_path(output_dir, prefix);
    writers::write_stats_file(&stats_path, volume.stats.stddev(), volume.stats.mean())?;
    info!(
        "Wrote {} block(s); stddev {} over {} samples",
        files.len(),
        volume.stats.stddev(),
        volume.stats.count()
    );

    let (a, b, c) = volume.cube.dim();
    Ok(ExtractionReport {
        files,
        volume_shape: [a, b, c],
        stats_path,
        stats: volume.stats,
        duplicates: volume.duplicates,
        holes: volume.holes,
    })
}

/// Write the whole survey in `input` as `<output_dir>/<prefix>.npy`.
pub fn extract_single_array(
    input: &Path,
    output_dir: &Path,
    prefix: &str,
    fields: HeaderFields,
) -> Result<ExtractionReport> {
    let volume = load_volume(input, fields)?;
    let path = output_dir.join(single_file_name(prefix));
    writers::write_cube(&path, &volume.cube)?;
    finish_report(output_dir, prefix, vec![path], &volume)
}

/// Write every complete `spec` tile of the survey in `input` to
/// `<output_dir>/<prefix>_<fast>_<slow>_<depth>.npy`.
pub fn extract_tiles(
    input: &Path,
    output_dir: &Path,
    prefix: &str,
    fields: HeaderFields,
    spec: TileSpec,
) -> Result<ExtractionReport> {
    let volume = load_volume(input, fields)?;
    let tiles = split_into_tiles(&volume.cube, spec)?;

    let mut files = Vec::with_capacity(tiles.len());
    for (origin, tile) in &tiles {
        let path = output_dir.join(tile_file_name(prefix, *origin));
        writers::write_cube(&path, tile)?;
        debug!("wrote tile {}", path.display());
        files.push(path);
    }

    finish_report(output_dir, prefix, files, &volume)
}

/// Rebuild a vertical column of tiles by concatenating them in depth order.
///
/// Only the tiles whose fast and slow origins match are used; overlapping
/// depth windows are concatenated as stored.
pub fn stitch_column(dir: &Path, prefix: &str, fast: usize, slow: usize) -> Result<Array3<f32>> {
    let mut column: BTreeMap<usize, PathBuf> = BTreeMap::new();
    for entry in fs::read_dir(dir).map_err(ReadError::from)? {
        let path = entry.map_err(ReadError::from)?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some([f, s, d]) = parse_tile_file_name(prefix, name) {
            if f == fast && s == slow {
                column.insert(d, path);
            }
        }
    }

    if column.is_empty() {
        return Err(AssemblyError::EmptyColumn {
            prefix: prefix.to_string(),
            fast,
            slow,
            dir: dir.to_path_buf(),
        });
    }

    let mut tiles = Vec::with_capacity(column.len());
    let mut expected: Option<[usize; 2]> = None;
    for path in column.values() {
        let tile = readers::read_cube(path)?;
        let (a, b, c) = tile.dim();
        match expected {
            None => expected = Some([a, b]),
            Some(e) if e != [a, b] => {
                return Err(AssemblyError::ColumnShapeMismatch {
                    path: path.clone(),
                    found: [a, b, c],
                    expected: e,
                })
            }
            Some(_) => {}
        }
        tiles.push(tile);
    }

    let views: Vec<_> = tiles.iter().map(|t| t.view()).collect();
    Ok(ndarray::concatenate(Axis(2), &views)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::segy::{SegyLayout, SegyWriter};
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    fn sample_value(il: i32, xl: i32, k: usize) -> f32 {
        ((il * 37 + xl * 11) % 97) as f32 - 48.0 + k as f32 * 0.125
    }

    /// Write an inline-sorted survey, skipping locations rejected by `keep`.
    fn write_survey(
        path: &Path,
        inlines: std::ops::Range<i32>,
        xlines: std::ops::Range<i32>,
        depth: usize,
        keep: impl Fn(i32, i32) -> bool,
    ) -> Vec<Vec<f32>> {
        let mut writer = SegyWriter::create(path, SegyLayout::new(depth)).unwrap();
        let mut traces = Vec::new();
        for il in inlines {
            for xl in xlines.clone() {
                if !keep(il, xl) {
                    continue;
                }
                let trace: Vec<f32> = (0..depth).map(|k| sample_value(il, xl, k)).collect();
                writer.write_trace(il, xl, &trace).unwrap();
                traces.push(trace);
            }
        }
        writer.finish().unwrap();
        traces
    }

    #[test]
    fn test_running_stats_matches_two_pass() {
        let values: Vec<f32> = (0..1000).map(|i| ((i * 7919) % 1013) as f32 - 500.0).collect();
        let mut stats = RunningStats::new();
        stats.extend(&values);

        let n = values.len() as f64;
        let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
        let var = values.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;

        assert_eq!(stats.count(), 1000);
        assert_relative_eq!(stats.mean(), mean, max_relative = 1e-12);
        assert_relative_eq!(stats.variance(), var, max_relative = 1e-12);
        assert_eq!(RunningStats::new().stddev(), 0.0);
    }

    #[test]
    fn test_tile_origin_counts() {
        assert_eq!(tile_origins(200, 128, 128), vec![0]);
        assert_eq!(tile_origins(200, 64, 64), vec![0, 64, 128]);
        assert_eq!(tile_origins(200, 128, 64).len(), 2);
        assert_eq!(tile_origins(10, 16, 16), Vec::<usize>::new());
        assert_eq!(tile_origins(16, 16, 4), vec![0]);

        for (len, n, stride) in [(200, 64, 16), (37, 5, 3), (100, 10, 10)] {
            assert_eq!(tile_origins(len, n, stride).len(), (len - n) / stride + 1);
        }
    }

    #[test]
    fn test_tile_spec_validation() {
        assert!(TileSpec::new(128, 64).is_ok());
        assert!(TileSpec::new(0, 1).is_err());
        assert!(TileSpec::new(8, 0).is_err());
        assert!(TileSpec::new(8, 9).is_err());
    }

    #[test]
    fn test_tile_names_roundtrip_and_sort() {
        let name = tile_file_name("seismic", [0, 64, 128]);
        assert_eq!(name, "seismic_00000_00064_00128.npy");
        assert_eq!(parse_tile_file_name("seismic", &name), Some([0, 64, 128]));
        assert_eq!(parse_tile_file_name("other", &name), None);
        assert_eq!(parse_tile_file_name("seismic", "seismic.npy"), None);

        let mut names = vec![
            tile_file_name("p", [0, 0, 128]),
            tile_file_name("p", [0, 0, 16]),
            tile_file_name("p", [0, 0, 1024]),
        ];
        names.sort();
        let depths: Vec<usize> = names
            .iter()
            .map(|n| parse_tile_file_name("p", n).unwrap()[2])
            .collect();
        assert_eq!(depths, vec![16, 128, 1024]);
    }

    #[test]
    fn test_single_array_matches_traces_exactly() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("normal.segy");
        let traces = write_survey(&input, 10..50, 100..300, 10, |_, _| true);

        let out = dir.path().join("out");
        let report =
            extract_single_array(&input, &out, "normal", HeaderFields::default()).unwrap();
        assert_eq!(report.files, vec![out.join("normal.npy")]);
        assert_eq!(report.volume_shape, [40, 200, 10]);
        assert_eq!(report.duplicates, 0);
        assert_eq!(report.holes, 0);

        let data = readers::read_cube(&report.files[0]).unwrap();
        let (fast_size, slow_size, _) = data.dim();
        let mut segy_sum = 0f32;
        let mut npy_sum = 0f32;
        for j in 0..fast_size {
            for i in 0..slow_size {
                let trace = &traces[i + j * slow_size];
                let data_trace = data.slice(s![j, i, ..]);
                for (a, b) in trace.iter().zip(data_trace.iter()) {
                    assert_eq!(a.to_bits(), b.to_bits(), "unmatched trace at {j}:{i}");
                }
                segy_sum += trace.iter().sum::<f32>();
                npy_sum += data_trace.iter().sum::<f32>();
            }
        }
        assert_eq!(segy_sum, npy_sum);
    }

    #[test]
    fn test_descending_line_numbers_keep_file_order() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("descending.segy");
        let depth = 6;
        let mut writer = SegyWriter::create(&input, SegyLayout::new(depth)).unwrap();
        let mut traces = Vec::new();
        for il in 10..14 {
            for xl in (100..106).rev() {
                let trace: Vec<f32> = (0..depth).map(|k| sample_value(il, xl, k)).collect();
                writer.write_trace(il, xl, &trace).unwrap();
                traces.push(trace);
            }
        }
        writer.finish().unwrap();

        let report =
            extract_single_array(&input, dir.path(), "desc", HeaderFields::default()).unwrap();
        assert_eq!(report.volume_shape, [4, 6, depth]);

        let data = readers::read_cube(&report.files[0]).unwrap();
        let slow_size = 6;
        let mismatched = (0..4)
            .flat_map(|f| (0..slow_size).map(move |s| (f, s)))
            .filter(|&(f, s)| {
                data.slice(s![f, s, ..]).to_vec() != traces[s + f * slow_size]
            })
            .count();
        assert_eq!(mismatched, 0);
        assert_eq!(data[[0, 0, 0]], sample_value(10, 105, 0));
    }

    #[test]
    fn test_repeated_coordinate_keeps_last_trace() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("repeat.segy");
        let depth = 4;
        let mut writer = SegyWriter::create(&input, SegyLayout::new(depth)).unwrap();
        for il in 0..3 {
            for xl in 0..4 {
                writer.write_trace(il, xl, &[1.0; 4]).unwrap();
            }
        }
        writer.write_trace(1, 2, &[5.0, 6.0, 7.0, 8.0]).unwrap();
        writer.finish().unwrap();

        let report =
            extract_single_array(&input, dir.path(), "rep", HeaderFields::default()).unwrap();
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.holes, 0);

        let data = readers::read_cube(&report.files[0]).unwrap();
        assert_eq!(data.slice(s![1, 2, ..]).to_vec(), vec![5.0, 6.0, 7.0, 8.0]);

        // Only the 12 placed traces are counted, not the overwritten one.
        assert_eq!(report.stats.count(), 12 * depth as u64);
        let expected_mean = (11.0 * 4.0 + 26.0) / 48.0;
        assert_relative_eq!(report.stats.mean(), expected_mean, max_relative = 1e-12);
    }

    #[test]
    fn test_single_array_with_holes_keeps_full_shape() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("donut.segy");
        write_survey(&input, 10..50, 100..300, 10, |il, xl| {
            !((20..30).contains(&il) && (150..170).contains(&xl))
        });

        let report =
            extract_single_array(&input, dir.path(), "donut", HeaderFields::default()).unwrap();
        assert_eq!(report.volume_shape, [40, 200, 10]);
        assert_eq!(report.holes, 200);

        let data = readers::read_cube(&report.files[0]).unwrap();
        assert!(data.slice(s![10, 50, ..]).iter().all(|&v| v == 0.0));
        assert_eq!(data[[0, 0, 0]], sample_value(10, 100, 0));
        assert_eq!(data[[39, 199, 9]], sample_value(49, 299, 9));
    }

    #[test]
    fn test_missing_leading_crosslines_are_placed_by_value() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("xlineerror.segy");
        write_survey(&input, 10..50, 100..300, 4, |il, xl| il != 10 || xl >= 125);

        let report =
            extract_single_array(&input, dir.path(), "xl", HeaderFields::default()).unwrap();
        assert_eq!(report.volume_shape, [40, 200, 4]);

        let data = readers::read_cube(&report.files[0]).unwrap();
        assert_eq!(data[[0, 25, 1]], sample_value(10, 125, 1));
        assert_eq!(data[[0, 24, 1]], 0.0);
        assert_eq!(data[[1, 0, 1]], sample_value(11, 100, 1));
    }

    #[test]
    fn test_stats_file_matches_volume_variance() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("normal.segy");
        let traces = write_survey(&input, 0..8, 0..12, 16, |_, _| true);

        let report = extract_single_array(&input, dir.path(), "vol", HeaderFields::default())
            .unwrap();
        let stored = readers::read_stats_file(&report.stats_path).unwrap();

        let all: Vec<f64> = traces.iter().flatten().map(|&v| v as f64).collect();
        let n = all.len() as f64;
        let mean = all.iter().sum::<f64>() / n;
        let std = (all.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();

        assert_relative_eq!(stored.stddev, std, max_relative = 1e-9);
        assert_relative_eq!(stored.mean.unwrap(), mean, max_relative = 1e-9, epsilon = 1e-12);
        assert_eq!(report.stats.count(), all.len() as u64);
    }

    #[test]
    fn test_tiles_drop_incomplete_windows() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("tiles.segy");
        write_survey(&input, 0..20, 0..35, 24, |_, _| true);

        let out = dir.path().join("tiles");
        let spec = TileSpec::new(8, 8).unwrap();
        let report =
            extract_tiles(&input, &out, "t", HeaderFields::default(), spec).unwrap();

        // 20 -> 2, 35 -> 4, 24 -> 3 windows.
        assert_eq!(report.files.len(), 2 * 4 * 3);
        assert!(out.join("t.txt").exists());

        let full = {
            let mut segy = SegyFile::open(&input).unwrap();
            let meta = read_metadata(&mut segy, HeaderFields::default()).unwrap();
            assemble_volume(&mut segy, &meta).unwrap().cube
        };
        let tile = readers::read_cube(&out.join(tile_file_name("t", [8, 16, 8]))).unwrap();
        assert_eq!(tile.dim(), (8, 8, 8));
        assert_eq!(tile, full.slice(s![8..16, 16..24, 8..16]).to_owned());
    }

    #[test]
    fn test_overlapping_tiles_and_stitching() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("column.segy");
        write_survey(&input, 0..4, 0..4, 16, |_, _| true);

        let out = dir.path().join("col");
        let disjoint = TileSpec::new(4, 4).unwrap();
        let report =
            extract_tiles(&input, &out, "c", HeaderFields::default(), disjoint).unwrap();
        assert_eq!(report.files.len(), 4);

        let column = stitch_column(&out, "c", 0, 0).unwrap();
        let mut segy = SegyFile::open(&input).unwrap();
        let meta = read_metadata(&mut segy, HeaderFields::default()).unwrap();
        let full = assemble_volume(&mut segy, &meta).unwrap().cube;
        assert_eq!(column, full);

        let overlapping = split_into_tiles(&full, TileSpec::new(4, 2).unwrap()).unwrap();
        assert_eq!(overlapping.len(), 7);
        assert_eq!(overlapping[1].0, [0, 0, 2]);
    }

    #[test]
    fn test_tile_larger_than_volume_is_rejected() {
        let cube = Array3::<f32>::zeros((40, 200, 10));
        let err = split_into_tiles(&cube, TileSpec::new(16, 16).unwrap()).unwrap_err();
        assert!(matches!(err, AssemblyError::NoCompleteTiles { .. }));
    }

    #[test]
    fn test_missing_input_is_reported() {
        let dir = tempdir().unwrap();
        let err = extract_single_array(
            &dir.path().join("absent.segy"),
            dir.path(),
            "x",
            HeaderFields::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AssemblyError::Segy(SegyError::Io { .. })));
    }

    #[test]
    fn test_stitch_missing_column() {
        let dir = tempdir().unwrap();
        let err = stitch_column(dir.path(), "none", 0, 0).unwrap_err();
        assert!(matches!(err, AssemblyError::EmptyColumn { .. }));
    }
}
