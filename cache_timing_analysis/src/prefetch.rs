/**
 * Next-line and stride prefetcher evidence.
 *
 * A timed load follows `training_size` loads with a fixed stride. If the prefetcher was trained,
 * the timed load is served by a close cache and its latency drops: the mean latency per training size
 * shows from which training size the prefetcher kicks in.
 */
use crate::error::AnalysisError;
use cache_timing_results::errors::{ConfigurationError, InsufficientDataError};
use cache_timing_results::matrices::{StrideMatrix, TrainingSizeSeries};
use cache_timing_results::statistics::{Summary, mean};
use cache_timing_results::tables::TrainingSizeSample;
use itertools::Itertools;
use rayon::prelude::*;
#[cfg(feature = "serde_support")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Strides measured by the stride experiment.
pub const REFERENCE_STRIDES: [u32; 14] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 12, 16, 24, 32];
/// The next-line report only lists the small training sizes.
pub const NEXT_LINE_REPORT_MAX: u32 = 10;

const MIN_MARK_SIZE: f64 = 50.0;
const MAX_MARK_SIZE: f64 = 75.0;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct ScatterPoint {
    pub training_size: u32,
    pub cycles: f64,
    /// Number of samples with the same cycle count, in the whole dataset.
    pub frequency: usize,
    pub mark_size: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct NextLineScatter {
    pub points: Vec<ScatterPoint>,
    /// Upper limit of the plot, mean + std of the untrained loads.
    pub y_max: Option<f64>,
    pub max_training_size: u32,
}

/// Samples at or under the ceiling.
pub fn filter_by_ceiling(samples: &[TrainingSizeSample], ceiling: f64) -> Vec<TrainingSizeSample> {
    samples
        .iter()
        .filter(|s| s.cycles <= ceiling)
        .copied()
        .collect()
}

pub fn mean_by_training_size(
    samples: &[TrainingSizeSample],
    ceiling: f64,
) -> Result<TrainingSizeSeries, InsufficientDataError> {
    let kept = filter_by_ceiling(samples, ceiling);
    if kept.is_empty() {
        return Err(InsufficientDataError::new(
            "training size samples under the RAM ceiling",
            0,
            1,
        ));
    }
    let groups = kept
        .into_iter()
        .into_group_map_by(|s| s.training_size);
    let mut series = TrainingSizeSeries::new();
    for (training_size, group) in groups {
        let cycles: Vec<f64> = group.iter().map(|s| s.cycles).collect();
        // Groups are never empty.
        if let Some(m) = mean(&cycles) {
            series.insert(training_size, m);
        }
    }
    Ok(series)
}

pub fn print_next_line_report(series: &TrainingSizeSeries) {
    println!("#### Next Line Analysis ####");
    for (training_size, average_latency) in series.range(..=NEXT_LINE_REPORT_MAX) {
        println!("{:4} |> {:8.2} cycles", training_size, average_latency);
    }
    println!();
}

/// Assembles the (training size x stride) matrix, one dataset per stride.
///
/// Columns follow the order of `partitions`, rows are sorted by training size. A training size
/// missing from a stride dataset leaves an empty cell.
pub fn stride_matrix(
    partitions: &[(u32, Vec<TrainingSizeSample>)],
    ceiling: f64,
) -> Result<StrideMatrix, AnalysisError> {
    if partitions.is_empty() {
        return Err(ConfigurationError::InvalidOption {
            option: "strides",
            reason: String::from("at least one stride is needed"),
        }
        .into());
    }
    let columns = partitions
        .par_iter()
        .map(|(stride, samples)| {
            mean_by_training_size(samples, ceiling).map_err(|e| {
                InsufficientDataError::new(format!("stride {}: {}", stride, e.what), e.got, e.needed)
            })
        })
        .collect::<Result<Vec<TrainingSizeSeries>, InsufficientDataError>>()?;

    let training_sizes: Vec<u32> = columns
        .iter()
        .flat_map(|series| series.keys().copied())
        .collect::<BTreeSet<u32>>()
        .into_iter()
        .collect();
    let cells = training_sizes
        .iter()
        .map(|ts| columns.iter().map(|series| series.get(ts).copied()).collect())
        .collect();

    Ok(StrideMatrix {
        training_sizes,
        strides: partitions.iter().map(|(stride, _)| *stride).collect(),
        cells,
    })
}

pub fn print_stride_report(matrix: &StrideMatrix) {
    println!("#### Stride Analysis ####");
    print!("{}", matrix);
    println!();
}

/// Points of the training size / cycles scatter plot, marks scaled by how common the latency is.
pub fn next_line_scatter(samples: &[TrainingSizeSample], ceiling: f64) -> NextLineScatter {
    let kept = filter_by_ceiling(samples, ceiling);
    let counts = kept.iter().counts_by(|s| s.cycles.to_bits());
    let (min_count, max_count) = counts
        .values()
        .copied()
        .minmax()
        .into_option()
        .unwrap_or((0, 0));

    let points = kept
        .iter()
        .map(|s| {
            let frequency = counts[&s.cycles.to_bits()];
            let mark_size = if max_count > min_count {
                MIN_MARK_SIZE
                    + (frequency - min_count) as f64 * (MAX_MARK_SIZE - MIN_MARK_SIZE)
                        / (max_count - min_count) as f64
            } else {
                MIN_MARK_SIZE
            };
            ScatterPoint {
                training_size: s.training_size,
                cycles: s.cycles,
                frequency,
                mark_size,
            }
        })
        .collect();

    let untrained: Vec<f64> = kept
        .iter()
        .filter(|s| s.training_size == 0)
        .map(|s| s.cycles)
        .collect();
    let y_max = Summary::of("untrained loads", &untrained)
        .ok()
        .map(|s| s.upper(1.0));

    NextLineScatter {
        points,
        y_max,
        max_training_size: kept.iter().map(|s| s.training_size).max().unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(raw: &[(u32, f64)]) -> Vec<TrainingSizeSample> {
        raw.iter()
            .map(|&(training_size, cycles)| TrainingSizeSample {
                training_size,
                cycles,
            })
            .collect()
    }

    #[test]
    fn grouped_means() {
        let series =
            mean_by_training_size(&samples(&[(0, 10.0), (0, 20.0), (1, 30.0)]), 100.0).unwrap();
        assert_eq!(series, TrainingSizeSeries::from([(0, 15.0), (1, 30.0)]));
    }

    #[test]
    fn ceiling_is_inclusive() {
        let s = samples(&[(0, 100.0), (0, 100.5), (2, 40.0), (2, 300.0)]);
        assert_eq!(filter_by_ceiling(&s, 100.0).len(), 2);
        let series = mean_by_training_size(&s, 100.0).unwrap();
        assert_eq!(series, TrainingSizeSeries::from([(0, 100.0), (2, 40.0)]));
    }

    #[test]
    fn everything_filtered() {
        let s = samples(&[(0, 500.0)]);
        assert!(mean_by_training_size(&s, 100.0).is_err());
        assert!(mean_by_training_size(&[], 100.0).is_err());
    }

    #[test]
    fn matrix_of_strides() {
        let partitions = vec![
            (2, samples(&[(0, 200.0), (1, 100.0), (1, 120.0), (3, 999.0)])),
            (1, samples(&[(1, 50.0), (2, 40.0), (0, 210.0)])),
        ];
        let matrix = stride_matrix(&partitions, 250.0).unwrap();
        assert_eq!(matrix.strides, vec![2, 1]);
        assert_eq!(matrix.training_sizes, vec![0, 1, 2]);
        assert_eq!(matrix.cells[0], vec![Some(200.0), Some(210.0)]);
        assert_eq!(matrix.cells[1], vec![Some(110.0), Some(50.0)]);
        assert_eq!(matrix.cells[2], vec![None, Some(40.0)]);
    }

    #[test]
    fn matrix_errors() {
        assert!(matches!(
            stride_matrix(&[], 100.0),
            Err(AnalysisError::Configuration(_))
        ));
        let partitions = vec![(4, samples(&[(0, 500.0)]))];
        match stride_matrix(&partitions, 100.0) {
            Err(AnalysisError::InsufficientData(e)) => assert!(e.what.starts_with("stride 4")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn scatter() {
        let s = samples(&[(0, 200.0), (0, 200.0), (0, 220.0), (3, 60.0), (4, 1000.0)]);
        let scatter = next_line_scatter(&s, 300.0);
        assert_eq!(scatter.points.len(), 4);
        assert_eq!(scatter.max_training_size, 3);
        assert_eq!(scatter.points[0].frequency, 2);
        assert_eq!(scatter.points[0].mark_size, 75.0);
        assert_eq!(scatter.points[3].mark_size, 50.0);
        let expected = 620.0 / 3.0 + (400.0f64 / 3.0).sqrt();
        assert!((scatter.y_max.unwrap() - expected).abs() < 1e-9);

        let lone = next_line_scatter(&samples(&[(2, 60.0)]), 300.0);
        assert_eq!(lone.y_max, None);
        assert_eq!(lone.points[0].mark_size, 50.0);
    }
}
