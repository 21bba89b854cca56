//! Survey geometry inference from unordered trace headers.
//!
//! A SEG-Y file stores traces line by line. The *fast* axis is the header
//! column whose value is held across a run of consecutive traces (lines of
//! that kind are stored contiguously, so reading one is fast); the *slow*
//! axis is the column that changes from one trace to the next inside a run.
//! For the usual inline-sorted survey the inline is fast and the crossline is
//! slow, and trace `s + f * slow_count` sits at cube position `(f, s)`.
//!
//! Resolution runs two rules in order:
//! 1. Over a short prefix (consecutive duplicates collapsed), the column with
//!    fewer value changes is fast.
//! 2. On a tie, the column with fewer distinct values over a longer window is
//!    fast.
//!
//! If both rules tie the file is reported as ambiguous instead of guessed.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use log::debug;
use thiserror::Error;

/// Number of pairs inspected by the short-prefix rule.
pub const PREFIX_WINDOW: usize = 10;

/// Number of pairs inspected by the distinct-value fallback.
pub const FALLBACK_WINDOW: usize = 4096;

/// Errors raised while resolving geometry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("no trace headers to resolve")]
    NoTraces,

    #[error("cannot infer survey axes from a single trace location")]
    Degenerate,

    #[error(
        "cannot decide the fast axis: both header columns change {changes} times \
         in the prefix and hold {distinct} distinct values in the fallback window"
    )]
    Ambiguous { changes: usize, distinct: usize },
}

/// Result type for geometry resolution.
pub type Result<T> = std::result::Result<T, GeometryError>;

/// Which raw header column was resolved as the fast axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Inline held across runs, crossline changes per trace.
    InlineFast,
    /// Crossline held across runs, inline changes per trace.
    CrosslineFast,
}

/// Remove duplicates, keeping the first occurrence of each value in order.
pub fn remove_duplicates<T: Eq + Hash + Copy>(values: &[T]) -> Vec<T> {
    let mut seen = HashSet::with_capacity(values.len());
    values.iter().copied().filter(|v| seen.insert(*v)).collect()
}

/// Distinct index values of one survey axis, in order of first appearance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisIndexSet {
    values: Vec<i32>,
}

impl AxisIndexSet {
    /// Build the set from raw header values (duplicates dropped).
    pub fn from_values(values: &[i32]) -> Self {
        Self {
            values: remove_duplicates(values),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values in order of first appearance.
    pub fn values(&self) -> &[i32] {
        &self.values
    }

    pub fn min(&self) -> Option<i32> {
        self.values.iter().copied().min()
    }

    pub fn max(&self) -> Option<i32> {
        self.values.iter().copied().max()
    }

    /// Whether line numbers mostly decrease in order of first appearance.
    pub fn is_descending(&self) -> bool {
        let (up, down) = self.values.windows(2).fold((0usize, 0usize), |(up, down), w| {
            if w[1] > w[0] {
                (up + 1, down)
            } else {
                (up, down + 1)
            }
        });
        down > up
    }

    /// Map every value to its rank along the file's numbering direction.
    ///
    /// Gapped values keep their own rank, so a missing line does not shift
    /// its neighbours. Descending surveys rank from the largest value.
    pub fn positions(&self) -> HashMap<i32, usize> {
        let mut sorted = self.values.clone();
        sorted.sort_unstable();
        if self.is_descending() {
            sorted.reverse();
        }
        sorted
            .into_iter()
            .enumerate()
            .map(|(rank, value)| (value, rank))
            .collect()
    }
}

/// Trace headers relabeled with canonical fast/slow columns, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceHeaderTable {
    fast: Vec<i32>,
    slow: Vec<i32>,
}

impl TraceHeaderTable {
    pub fn new(fast: Vec<i32>, slow: Vec<i32>) -> Self {
        debug_assert_eq!(fast.len(), slow.len(), "columns must have equal length");
        Self { fast, slow }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fast.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fast.is_empty()
    }

    pub fn fast(&self) -> &[i32] {
        &self.fast
    }

    pub fn slow(&self) -> &[i32] {
        &self.slow
    }

    /// (fast, slow) pairs in file order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.fast.iter().copied().zip(self.slow.iter().copied())
    }
}

/// Resolved survey geometry of one file.
#[derive(Debug, Clone)]
pub struct Geometry {
    pub orientation: Orientation,
    pub fast: AxisIndexSet,
    pub slow: AxisIndexSet,
    pub headers: TraceHeaderTable,
}

impl Geometry {
    /// Number of trace headers resolved.
    pub fn trace_count(&self) -> usize {
        self.headers.len()
    }
}

fn collapse_consecutive(pairs: &[(i32, i32)], limit: usize) -> Vec<(i32, i32)> {
    let mut collapsed: Vec<(i32, i32)> = Vec::with_capacity(limit);
    for &pair in pairs {
        if collapsed.last() != Some(&pair) {
            collapsed.push(pair);
            if collapsed.len() == limit {
                break;
            }
        }
    }
    collapsed
}

fn count_changes(pairs: &[(i32, i32)]) -> (usize, usize) {
    pairs.windows(2).fold((0, 0), |(a, b), w| {
        (
            a + usize::from(w[0].0 != w[1].0),
            b + usize::from(w[0].1 != w[1].1),
        )
    })
}

/// Decide which raw header column is the fast axis.
///
/// `pairs` are (inline, crossline) values in file order.
pub fn identify_fast_direction(pairs: &[(i32, i32)]) -> Result<Orientation> {
    if pairs.is_empty() {
        return Err(GeometryError::NoTraces);
    }

    let prefix = collapse_consecutive(pairs, PREFIX_WINDOW);
    if prefix.len() < 2 {
        return Err(GeometryError::Degenerate);
    }

    let (inline_changes, crossline_changes) = count_changes(&prefix);
    debug!(
        "prefix of {} pairs: inline changes {}, crossline changes {}",
        prefix.len(),
        inline_changes,
        crossline_changes
    );
    if inline_changes < crossline_changes {
        return Ok(Orientation::InlineFast);
    }
    if crossline_changes < inline_changes {
        return Ok(Orientation::CrosslineFast);
    }

    let window = &pairs[..pairs.len().min(FALLBACK_WINDOW)];
    let inline_distinct = window.iter().map(|p| p.0).collect::<HashSet<_>>().len();
    let crossline_distinct = window.iter().map(|p| p.1).collect::<HashSet<_>>().len();
    debug!(
        "prefix tie, fallback over {} pairs: inline distinct {}, crossline distinct {}",
        window.len(),
        inline_distinct,
        crossline_distinct
    );

    if inline_distinct < crossline_distinct {
        Ok(Orientation::InlineFast)
    } else if crossline_distinct < inline_distinct {
        Ok(Orientation::CrosslineFast)
    } else {
        Err(GeometryError::Ambiguous {
            changes: inline_changes,
            distinct: inline_distinct,
        })
    }
}

/// Resolve the fast/slow axes and their index sets from header pairs.
pub fn resolve_geometry(pairs: &[(i32, i32)]) -> Result<Geometry> {
    let orientation = identify_fast_direction(pairs)?;

    let (fast, slow): (Vec<i32>, Vec<i32>) = match orientation {
        Orientation::InlineFast => pairs.iter().copied().unzip(),
        Orientation::CrosslineFast => pairs.iter().map(|&(il, xl)| (xl, il)).unzip(),
    };

    Ok(Geometry {
        orientation,
        fast: AxisIndexSet::from_values(&fast),
        slow: AxisIndexSet::from_values(&slow),
        headers: TraceHeaderTable::new(fast, slow),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(fast: std::ops::Range<i32>, slow: std::ops::Range<i32>) -> Vec<(i32, i32)> {
        fast.flat_map(|f| slow.clone().map(move |s| (f, s))).collect()
    }

    #[test]
    fn test_remove_duplicates_should_keep_order() {
        let result = remove_duplicates(&[1, 2, 3, 3, 5, 8, 4, 2]);
        assert_eq!(result, vec![1, 2, 3, 5, 8, 4]);
    }

    #[test]
    fn test_short_runs_resolve_inline_fast() {
        let pairs = vec![
            (101, 301),
            (102, 301),
            (102, 302),
            (102, 303),
            (103, 301),
            (103, 302),
        ];
        assert_eq!(
            identify_fast_direction(&pairs),
            Ok(Orientation::InlineFast)
        );

        let pairs = vec![
            (101, 301),
            (102, 301),
            (102, 302),
            (102, 303),
            (102, 304),
            (102, 305),
        ];
        assert_eq!(
            identify_fast_direction(&pairs),
            Ok(Orientation::InlineFast)
        );
    }

    #[test]
    fn test_inline_sorted_survey() {
        let pairs = grid(10..50, 100..300);
        let geometry = resolve_geometry(&pairs).unwrap();

        assert_eq!(geometry.orientation, Orientation::InlineFast);
        assert_eq!(geometry.fast.len(), 40);
        assert_eq!(geometry.slow.len(), 200);
        assert_eq!(geometry.trace_count(), 8000);
        assert_eq!(geometry.headers.fast()[0], 10);
        assert_eq!(geometry.headers.slow()[0], 100);
    }

    #[test]
    fn test_crossline_sorted_survey_is_relabeled() {
        let pairs: Vec<(i32, i32)> = grid(100..300, 10..50)
            .into_iter()
            .map(|(xl, il)| (il, xl))
            .collect();
        let geometry = resolve_geometry(&pairs).unwrap();

        assert_eq!(geometry.orientation, Orientation::CrosslineFast);
        assert_eq!(geometry.fast.len(), 200);
        assert_eq!(geometry.slow.len(), 40);
        assert_eq!(geometry.headers.fast()[0], 100);
        assert_eq!(geometry.headers.slow()[0], 10);
    }

    #[test]
    fn test_donut_hole_keeps_gapped_values() {
        let pairs: Vec<(i32, i32)> = grid(10..50, 100..300)
            .into_iter()
            .filter(|&(il, xl)| !((20..30).contains(&il) && (150..170).contains(&xl)))
            .collect();
        let geometry = resolve_geometry(&pairs).unwrap();

        assert_eq!(geometry.trace_count(), 8000 - 200);
        assert_eq!(geometry.fast.len(), 40);
        assert_eq!(geometry.slow.len(), 200);
    }

    #[test]
    fn test_missing_leading_crosslines() {
        // First inline starts at crossline 125; later inlines are complete.
        let pairs: Vec<(i32, i32)> = grid(10..50, 100..300)
            .into_iter()
            .filter(|&(il, xl)| il != 10 || xl >= 125)
            .collect();
        let geometry = resolve_geometry(&pairs).unwrap();

        assert_eq!(geometry.headers.slow()[0], 125);
        assert_eq!(geometry.headers.fast()[0], 10);
        assert_eq!(geometry.slow.len(), 200);
        assert_eq!(geometry.slow.values()[0], 125);

        let positions = geometry.slow.positions();
        assert_eq!(positions[&100], 0);
        assert_eq!(positions[&125], 25);
    }

    #[test]
    fn test_gapped_index_values_are_not_renumbered() {
        let pairs = grid(0..3, 0..4)
            .into_iter()
            .map(|(f, s)| (f * 5 + 1, s * 2))
            .collect::<Vec<_>>();
        let geometry = resolve_geometry(&pairs).unwrap();

        assert_eq!(geometry.fast.values(), &[1, 6, 11]);
        assert_eq!(geometry.slow.values(), &[0, 2, 4, 6]);
        assert_eq!(geometry.fast.positions()[&11], 2);
    }

    #[test]
    fn test_descending_axes_rank_in_file_direction() {
        let pairs: Vec<(i32, i32)> = (0..4)
            .flat_map(|il| (0..6).map(move |xl| (110 - il, 105 - xl)))
            .collect();
        let geometry = resolve_geometry(&pairs).unwrap();

        assert!(geometry.fast.is_descending());
        assert!(geometry.slow.is_descending());
        let fast = geometry.fast.positions();
        let slow = geometry.slow.positions();
        assert_eq!((fast[&110], fast[&107]), (0, 3));
        assert_eq!((slow[&105], slow[&100]), (0, 5));
    }

    #[test]
    fn test_missing_lines_keep_descending_rank() {
        // First inline starts at crossline 203, later ones at 205.
        let pairs: Vec<(i32, i32)> = grid(0..5, 0..6)
            .into_iter()
            .map(|(il, xl)| (il, 205 - xl))
            .filter(|&(il, xl)| il != 0 || xl <= 203)
            .collect();
        let geometry = resolve_geometry(&pairs).unwrap();

        assert!(geometry.slow.is_descending());
        let slow = geometry.slow.positions();
        assert_eq!(slow[&205], 0);
        assert_eq!(slow[&203], 2);
        assert!(!geometry.fast.is_descending());
    }

    #[test]
    fn test_consecutive_duplicates_are_ignored() {
        let mut pairs = Vec::new();
        for (f, s) in grid(1..4, 1..5) {
            pairs.push((f, s));
            pairs.push((f, s));
        }
        let geometry = resolve_geometry(&pairs).unwrap();

        assert_eq!(geometry.orientation, Orientation::InlineFast);
        assert_eq!(geometry.fast.len(), 3);
        assert_eq!(geometry.slow.len(), 4);
        assert_eq!(geometry.trace_count(), 24);
    }

    #[test]
    fn test_prefix_tie_uses_distinct_fallback() {
        // Both columns change on every trace in the prefix, but the inline
        // only takes two values across the window.
        let pairs: Vec<(i32, i32)> = (0..40).map(|i| (i % 2, i)).collect();
        assert_eq!(
            identify_fast_direction(&pairs),
            Ok(Orientation::InlineFast)
        );
    }

    #[test]
    fn test_diagonal_is_ambiguous() {
        let pairs: Vec<(i32, i32)> = (0..20).map(|i| (i, i + 100)).collect();
        assert!(matches!(
            identify_fast_direction(&pairs),
            Err(GeometryError::Ambiguous { .. })
        ));
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(resolve_geometry(&[]).unwrap_err(), GeometryError::NoTraces);
        assert_eq!(
            resolve_geometry(&[(5, 7)]).unwrap_err(),
            GeometryError::Degenerate
        );
        assert_eq!(
            resolve_geometry(&[(5, 7), (5, 7), (5, 7)]).unwrap_err(),
            GeometryError::Degenerate
        );
    }

    #[test]
    fn test_single_line_survey() {
        let pairs: Vec<(i32, i32)> = (0..50).map(|xl| (7, xl)).collect();
        let geometry = resolve_geometry(&pairs).unwrap();

        assert_eq!(geometry.orientation, Orientation::InlineFast);
        assert_eq!(geometry.fast.len(), 1);
        assert_eq!(geometry.slow.len(), 50);
    }
}
