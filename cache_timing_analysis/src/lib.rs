#![deny(unsafe_op_in_unsafe_fn)]

/**
 * Cache timing analysis pipeline.
 *
 * From the raw measurements, derives the latency bounds of each cache level, the L3 checker,
 * the prefetcher evidence (next line and strides) and the occupancy heatmaps around target sets.
 * Reports are printed on stdout, figures go through a `Renderer`.
 */
pub mod discovery;
pub mod error;
pub mod latency;
pub mod occupancy;
pub mod prefetch;
pub mod render;

pub use discovery::{OccupancyInput, discover_occupancy_inputs};
pub use error::AnalysisError;
pub use render::{NullRenderer, PgfRenderer, Renderer};

use crate::latency::{LatencyBoundEstimator, TimingSummary, print_timing_report};
use crate::occupancy::{DEFAULT_WINDOW_RADIUS, OccupancyWindowExtractor, print_occupancy_report};
use crate::prefetch::{
    NextLineScatter, REFERENCE_STRIDES, mean_by_training_size, next_line_scatter,
    print_next_line_report, print_stride_report, stride_matrix,
};
use cache_timing_results::MAX_SET_INDEX;
#[cfg(feature = "serde_support")]
use cache_timing_results::archive::{ArchiveError, read_archive, write_archive};
use cache_timing_results::classifiers::{Band, BandCounts, BoundaryClassifier};
use cache_timing_results::matrices::{OccupancyWindow, StrideMatrix, TrainingSizeSeries};
use cache_timing_results::statistics::LatencyBounds;
use cache_timing_results::tables::{
    DataError, OccupancyTable, TimingTable, TrainingSizeSample, load_training_size_samples,
};
use rayon::prelude::*;
#[cfg(feature = "serde_support")]
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Optional analyses. The timing bounds are always computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct Analyses {
    pub next_line: bool,
    pub strides: bool,
    pub occupancy: bool,
}

impl Default for Analyses {
    fn default() -> Self {
        Self {
            next_line: false,
            strides: false,
            occupancy: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct AnalysisConfig {
    pub timing_path: PathBuf,
    pub next_line_path: PathBuf,
    /// Contains one `<stride>.csv` per stride.
    pub strides_dir: PathBuf,
    pub occupancy_inputs: Vec<OccupancyInput>,
    pub output_dir: PathBuf,
    pub plot: bool,
    pub compile_pdf: bool,
    pub l3_upper_sigmas: f64,
    pub window_radius: u64,
    pub max_set_index: u64,
    pub strides: Vec<u32>,
    pub analyses: Analyses,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::from_dirs("results", "figs")
    }
}

impl AnalysisConfig {
    /// Reference file layout under `results`, figures in `figs`. Occupancy inputs are left empty,
    /// see `discover_occupancy_inputs`.
    pub fn from_dirs(results: impl AsRef<Path>, figs: impl Into<PathBuf>) -> Self {
        let results = results.as_ref();
        Self {
            timing_path: results.join("timing.csv"),
            next_line_path: results.join("next_line.csv"),
            strides_dir: results.join("strides"),
            occupancy_inputs: Vec::new(),
            output_dir: figs.into(),
            plot: true,
            compile_pdf: false,
            l3_upper_sigmas: latency::DEFAULT_L3_UPPER_SIGMAS,
            window_radius: DEFAULT_WINDOW_RADIUS,
            max_set_index: MAX_SET_INDEX,
            strides: REFERENCE_STRIDES.to_vec(),
            analyses: Analyses::default(),
        }
    }

    pub fn renderer(&self) -> Box<dyn Renderer> {
        if self.plot {
            Box::new(PgfRenderer::new(&self.output_dir, self.compile_pdf))
        } else {
            Box::new(NullRenderer)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct NextLineResult {
    pub series: TrainingSizeSeries,
    pub scatter: NextLineScatter,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct OccupancyResult {
    pub input: OccupancyInput,
    pub window: OccupancyWindow,
    /// Band of each cell of the window against the L3 checker, `None` where nothing was measured.
    pub cells: Vec<Vec<Option<Band>>>,
    pub bands: BandCounts,
}

/// Everything derived by one run of the pipeline.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct AnalysisResults {
    pub config: AnalysisConfig,
    pub bounds: LatencyBounds,
    pub l3_checker: BoundaryClassifier,
    pub timing_summary: TimingSummary,
    pub next_line: Option<NextLineResult>,
    pub strides: Option<StrideMatrix>,
    pub occupancy: Vec<OccupancyResult>,
}

#[cfg(feature = "serde_support")]
impl AnalysisResults {
    /// msgpack, zstd compressed if the path ends in `.zst`.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), ArchiveError> {
        write_archive(self, path)
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        read_archive(path)
    }
}

fn next_line_analysis(
    config: &AnalysisConfig,
    ceiling: f64,
    renderer: &mut dyn Renderer,
) -> Result<NextLineResult, AnalysisError> {
    let samples = load_training_size_samples(&config.next_line_path)?;
    let series = mean_by_training_size(&samples, ceiling)?;
    print_next_line_report(&series);
    let scatter = next_line_scatter(&samples, ceiling);
    renderer.next_line_scatter(&scatter)?;
    Ok(NextLineResult { series, scatter })
}

fn stride_analysis(
    config: &AnalysisConfig,
    ceiling: f64,
    renderer: &mut dyn Renderer,
) -> Result<StrideMatrix, AnalysisError> {
    let partitions = config
        .strides
        .par_iter()
        .map(|&stride| {
            let path = config.strides_dir.join(format!("{}.csv", stride));
            load_training_size_samples(&path).map(|samples| (stride, samples))
        })
        .collect::<Result<Vec<(u32, Vec<TrainingSizeSample>)>, DataError>>()?;
    let matrix = stride_matrix(&partitions, ceiling)?;
    print_stride_report(&matrix);
    renderer.stride_heatmap(&matrix)?;
    Ok(matrix)
}

fn occupancy_analysis(
    config: &AnalysisConfig,
    checker: &BoundaryClassifier,
    renderer: &mut dyn Renderer,
) -> Result<Vec<OccupancyResult>, AnalysisError> {
    let extractor = OccupancyWindowExtractor::new(config.window_radius, config.max_set_index);
    for input in &config.occupancy_inputs {
        if input.target_set > config.max_set_index {
            tracing::warn!(
                path = %input.path.display(),
                target_set = input.target_set,
                max_set = config.max_set_index,
                "target set past the last set, window clamped to the last sets"
            );
        }
    }

    let windows = config
        .occupancy_inputs
        .par_iter()
        .map(|input| -> Result<OccupancyWindow, AnalysisError> {
            let table = OccupancyTable::load(&input.path)?;
            Ok(extractor.extract(&table, input.target_set, input.warmup_lines)?)
        })
        .collect::<Result<Vec<OccupancyWindow>, AnalysisError>>()?;

    if !windows.is_empty() {
        println!("#### Occupancy Analysis ####");
    }
    let mut results = Vec::with_capacity(windows.len());
    for (input, window) in config.occupancy_inputs.iter().zip(windows) {
        let cells = window.matrix.classify(checker);
        let bands = window.matrix.band_counts(checker);
        print_occupancy_report(&window, checker, &bands);
        renderer.occupancy_heatmap(&input.artifact_name(), &window)?;
        results.push(OccupancyResult {
            input: input.clone(),
            window,
            cells,
            bands,
        });
    }
    Ok(results)
}

/// Runs the enabled analyses, in order: timing bounds, L3 checker, next line, strides and
/// occupancy.
pub fn run_analysis(
    config: &AnalysisConfig,
    renderer: &mut dyn Renderer,
) -> Result<AnalysisResults, AnalysisError> {
    let estimator = LatencyBoundEstimator::new(config.l3_upper_sigmas)?;
    let timing = TimingTable::load(&config.timing_path)?;
    let estimate = estimator.estimate(&timing)?;
    let bounds = estimate.bounds;
    print_timing_report(&estimate.summary, &bounds);
    renderer.latency_histogram(&estimate.filtered, &bounds)?;

    let l3_checker = BoundaryClassifier::from_l3_bounds(&bounds)?;
    tracing::debug!(checker = %l3_checker, "L3 checker");

    let next_line = if config.analyses.next_line {
        Some(next_line_analysis(config, bounds.ram_ceiling, renderer)?)
    } else {
        None
    };

    let strides = if config.analyses.strides {
        Some(stride_analysis(config, bounds.ram_ceiling, renderer)?)
    } else {
        None
    };

    let occupancy = if config.analyses.occupancy {
        occupancy_analysis(config, &l3_checker, renderer)?
    } else {
        Vec::new()
    };

    Ok(AnalysisResults {
        config: config.clone(),
        bounds,
        l3_checker,
        timing_summary: estimate.summary,
        next_line,
        strides,
        occupancy,
    })
}
