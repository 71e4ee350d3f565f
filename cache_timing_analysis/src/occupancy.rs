/**
 * Occupancy heatmaps : latency of every line of the sets around a target set.
 *
 * The measurement fills the target set (optionally after warming up some lines), then times the
 * lines of the neighbouring sets. Cycles are first averaged per (iteration, set, line) so that
 * every iteration weighs the same, then across iterations.
 */
use cache_timing_results::MAX_SET_INDEX;
use cache_timing_results::classifiers::{BandCounts, BoundaryClassifier};
use cache_timing_results::errors::InsufficientDataError;
use cache_timing_results::matrices::{OccupancyWindow, SetByLineMatrix};
use cache_timing_results::statistics::mean;
use cache_timing_results::tables::OccupancyTable;
use itertools::Itertools;
#[cfg(feature = "serde_support")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of sets shown on each side of the target set.
pub const DEFAULT_WINDOW_RADIUS: u64 = 10;

/// Inclusive range of set indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct SetWindow {
    pub first: u64,
    pub last: u64,
}

impl SetWindow {
    pub fn width(&self) -> u64 {
        self.last - self.first + 1
    }
}

/// `[target - radius, target + radius]`, shifted (not truncated) to fit in `[0, max_set]`.
///
/// The window only shrinks when `[0, max_set]` itself is narrower than `2 * radius + 1`.
pub fn clamp_window(target: u64, radius: u64, max_set: u64) -> SetWindow {
    let target = target as i128;
    let radius = radius as i128;
    let max_set = max_set as i128;

    let mut expected_min = target - radius;
    let mut expected_max = target + radius;

    if expected_min < 0 {
        expected_max += expected_min.abs();
        expected_min = 0;
    }

    if expected_max > max_set {
        expected_min -= expected_max - max_set;
        expected_max = max_set;
    }

    SetWindow {
        first: expected_min.max(0) as u64,
        last: expected_max as u64,
    }
}

/// Mean cycles per (set, line), over the iterations.
pub fn set_by_line_matrix(table: &OccupancyTable) -> Result<SetByLineMatrix, InsufficientDataError> {
    if table.is_empty() {
        return Err(InsufficientDataError::new(
            format!("occupancy samples of {}", table.origin),
            0,
            1,
        ));
    }

    let per_iteration = table
        .samples
        .iter()
        .map(|s| ((s.set_index, s.line_index, s.iteration), s.cycles))
        .into_group_map();

    let mut per_cell: BTreeMap<(u64, u64), Vec<f64>> = BTreeMap::new();
    for ((set_index, line_index, _iteration), cycles) in per_iteration {
        if let Some(m) = mean(&cycles) {
            per_cell.entry((set_index, line_index)).or_default().push(m);
        }
    }

    let set_indices: Vec<u64> = per_cell.keys().map(|&(s, _)| s).dedup().collect();
    let line_indices: Vec<u64> = per_cell.keys().map(|&(_, l)| l).sorted().dedup().collect();

    let cells = set_indices
        .iter()
        .map(|&set_index| {
            line_indices
                .iter()
                .map(|&line_index| {
                    per_cell
                        .get(&(set_index, line_index))
                        .and_then(|means| mean(means))
                })
                .collect()
        })
        .collect();

    Ok(SetByLineMatrix {
        set_indices,
        line_indices,
        cells,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct OccupancyWindowExtractor {
    pub radius: u64,
    pub max_set: u64,
}

impl Default for OccupancyWindowExtractor {
    fn default() -> Self {
        Self {
            radius: DEFAULT_WINDOW_RADIUS,
            max_set: MAX_SET_INDEX,
        }
    }
}

impl OccupancyWindowExtractor {
    /// A radius wider than `[0, max_set]` selects the whole range.
    pub fn new(radius: u64, max_set: u64) -> Self {
        Self { radius, max_set }
    }

    pub fn window(&self, target_set: u64) -> SetWindow {
        clamp_window(target_set, self.radius, self.max_set)
    }

    /// Rows of the sets in the window around `target_set`.
    ///
    /// Sets that were not measured are absent, so the result may have less than
    /// `2 * radius + 1` rows.
    pub fn extract(
        &self,
        table: &OccupancyTable,
        target_set: u64,
        warmup_lines: u32,
    ) -> Result<OccupancyWindow, InsufficientDataError> {
        let matrix = set_by_line_matrix(table)?;
        Ok(self.extract_from_matrix(&matrix, target_set, warmup_lines))
    }

    pub fn extract_from_matrix(
        &self,
        matrix: &SetByLineMatrix,
        target_set: u64,
        warmup_lines: u32,
    ) -> OccupancyWindow {
        let window = self.window(target_set);
        OccupancyWindow {
            target_set,
            warmup_lines,
            first_set: window.first,
            last_set: window.last,
            matrix: matrix.select_sets(window.first, window.last),
        }
    }
}

pub fn print_occupancy_report(
    window: &OccupancyWindow,
    checker: &BoundaryClassifier,
    counts: &BandCounts,
) {
    println!(
        "[occupancy] Set {} with {} warmup lines: sets [{}, {}] ({} rows), L3 {} -> {}",
        window.target_set,
        window.warmup_lines,
        window.first_set,
        window.last_set,
        window.matrix.len(),
        checker,
        counts
    );
}
