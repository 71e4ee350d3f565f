/**
 * Latency bounds of the cache levels, from the timing dataset.
 *
 * The RAM ceiling (mean + one standard deviation of the RAM column) is computed on all the trials,
 * then every trial with any level above the ceiling is dropped: a single slow access means the
 * trial was disturbed. Level bounds are `mean ± k * std` on the remaining trials.
 */
use crate::error::AnalysisError;
use cache_timing_results::errors::{ConfigurationError, InsufficientDataError};
use cache_timing_results::statistics::{LatencyBounds, Summary};
use cache_timing_results::tables::TimingTable;
#[cfg(feature = "serde_support")]
use serde::{Deserialize, Serialize};

pub const DEFAULT_L3_UPPER_SIGMAS: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct LatencyBoundEstimator {
    pub l2_column: String,
    pub l3_column: String,
    pub ram_column: String,
    /// `l3_upper = mean(L3) + l3_upper_sigmas * std(L3)`
    pub l3_upper_sigmas: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct ColumnSummary {
    pub column: String,
    pub summary: Summary,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct TimingSummary {
    pub total_trials: usize,
    pub kept_trials: usize,
    pub columns: Vec<ColumnSummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LatencyEstimate {
    pub bounds: LatencyBounds,
    pub summary: TimingSummary,
    /// Trials that survived the RAM ceiling.
    pub filtered: TimingTable,
}

impl Default for LatencyBoundEstimator {
    fn default() -> Self {
        Self {
            l2_column: String::from("L2"),
            l3_column: String::from("L3"),
            ram_column: String::from("RAM"),
            l3_upper_sigmas: DEFAULT_L3_UPPER_SIGMAS,
        }
    }
}

impl LatencyBoundEstimator {
    pub fn new(l3_upper_sigmas: f64) -> Result<Self, ConfigurationError> {
        if !l3_upper_sigmas.is_finite() || l3_upper_sigmas < 0.0 {
            return Err(ConfigurationError::InvalidOption {
                option: "l3_upper_sigmas",
                reason: format!("expected a non negative number, got {}", l3_upper_sigmas),
            });
        }
        Ok(Self {
            l3_upper_sigmas,
            ..Self::default()
        })
    }

    pub fn estimate(&self, table: &TimingTable) -> Result<LatencyEstimate, AnalysisError> {
        let ram = Summary::of(&self.ram_column, &table.column(&self.ram_column)?)?;
        let ram_ceiling = ram.upper(1.0);

        let filtered = table.filter_rows(|row| !row.iter().any(|&v| v > ram_ceiling));

        let columns = filtered
            .columns()
            .iter()
            .map(|column| -> Result<ColumnSummary, AnalysisError> {
                let values = filtered.column(column)?;
                let summary = Summary::of(&format!("{} after RAM ceiling", column), &values)?;
                Ok(ColumnSummary {
                    column: column.clone(),
                    summary,
                })
            })
            .collect::<Result<Vec<ColumnSummary>, AnalysisError>>()?;

        let find = |name: &str| -> Result<Summary, AnalysisError> {
            // Index first, to report a missing column rather than an empty one.
            let index = filtered.column_index(name)?;
            columns
                .get(index)
                .map(|c| c.summary)
                .ok_or_else(|| InsufficientDataError::new(name, 0, 2).into())
        };
        let l2 = find(&self.l2_column)?;
        let l3 = find(&self.l3_column)?;

        Ok(LatencyEstimate {
            bounds: LatencyBounds {
                l2_upper: l2.upper(1.0),
                l3_lower: l3.lower(1.0),
                l3_upper: l3.upper(self.l3_upper_sigmas),
                ram_ceiling,
                l3_upper_sigmas: self.l3_upper_sigmas,
            },
            summary: TimingSummary {
                total_trials: table.len(),
                kept_trials: filtered.len(),
                columns,
            },
            filtered,
        })
    }
}

pub fn print_timing_report(summary: &TimingSummary, bounds: &LatencyBounds) {
    println!("#### Timing Analysis ####");
    println!(
        "[timing] Kept {} of {} trials under the RAM ceiling",
        summary.kept_trials, summary.total_trials
    );
    for c in &summary.columns {
        println!("{:>4} |> {}", c.column, c.summary);
    }
    println!("[timing] {}", bounds);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use cache_timing_results::tables::DataError;

    fn table(data: &str) -> TimingTable {
        TimingTable::parse(data.as_bytes(), "timing.csv").unwrap()
    }

    #[test]
    fn zero_variance_collapses_to_mean() {
        let t = table("L2,L3,RAM\n10,50,200\n10,50,200\n10,50,200\n");
        let estimate = LatencyBoundEstimator::default().estimate(&t).unwrap();
        assert_eq!(
            estimate.bounds,
            LatencyBounds {
                l2_upper: 10.0,
                l3_lower: 50.0,
                l3_upper: 50.0,
                ram_ceiling: 200.0,
                l3_upper_sigmas: 1.0,
            }
        );
        assert_eq!(estimate.summary.kept_trials, 3);
        assert_eq!(estimate.filtered, t);
    }

    #[test]
    fn outlier_rows_are_dropped_entirely() {
        // RAM: mean 210, sample std 10 -> ceiling 220.
        // The third trial has a 400 cycles L3 access: the whole trial goes.
        let t = table(
            "L1,L2,L3,RAM\n4,10,40,200\n4,12,44,200\n4,11,400,210\n4,13,46,220\n4,11,45,220\n",
        );
        let estimate = LatencyBoundEstimator::default().estimate(&t).unwrap();
        assert_eq!(estimate.bounds.ram_ceiling, 220.0);
        assert_eq!(estimate.summary.total_trials, 5);
        assert_eq!(estimate.summary.kept_trials, 4);
        assert_eq!(
            estimate.filtered.column("L3").unwrap(),
            vec![40.0, 44.0, 46.0, 45.0]
        );
        // A value equal to the ceiling is kept.
        let ram = estimate.filtered.column("RAM").unwrap();
        assert_eq!(ram, vec![200.0, 200.0, 220.0, 220.0]);
        let l3 = estimate.summary.columns[2].summary;
        assert_eq!(l3.mean, 43.75);
        assert!((estimate.bounds.l3_lower - (l3.mean - l3.std_dev)).abs() < 1e-12);
        assert_eq!(estimate.summary.columns.len(), 4);
        assert_eq!(estimate.summary.columns[0].summary.std_dev, 0.0);
    }

    #[test]
    fn configurable_l3_multiplier() {
        let t = table("L2,L3,RAM\n10,40,200\n12,60,200\n");
        let one = LatencyBoundEstimator::default().estimate(&t).unwrap();
        let two = LatencyBoundEstimator::new(2.0).unwrap().estimate(&t).unwrap();
        let std = (200.0f64).sqrt();
        assert!((one.bounds.l3_upper - (50.0 + std)).abs() < 1e-9);
        assert!((two.bounds.l3_upper - (50.0 + 2.0 * std)).abs() < 1e-9);
        assert_eq!(one.bounds.l3_lower, two.bounds.l3_lower);
        assert!(LatencyBoundEstimator::new(-1.0).is_err());
        assert!(LatencyBoundEstimator::new(f64::INFINITY).is_err());
    }

    #[test]
    fn constant_ram_keeps_everything() {
        let t = table("L2,L3,RAM\n9,47,180\n14,52,180\n11,55,180\n");
        let estimate = LatencyBoundEstimator::default().estimate(&t).unwrap();
        assert_eq!(estimate.bounds.ram_ceiling, 180.0);
        assert_eq!(estimate.filtered.len(), 3);
    }

    #[test]
    fn idempotent() {
        let t = table("L2,L3,RAM\n10,40,190\n12,44,210\n11,47,230\n13,46,210\n");
        let estimator = LatencyBoundEstimator::default();
        assert_eq!(
            estimator.estimate(&t).unwrap().bounds,
            estimator.estimate(&t).unwrap().bounds
        );
    }

    #[test]
    fn insufficient_data() {
        let t = table("L2,L3,RAM\n");
        assert!(matches!(
            LatencyBoundEstimator::default().estimate(&t),
            Err(AnalysisError::InsufficientData(_))
        ));
        let t = table("L2,L3,RAM\n10,50,200\n");
        assert!(matches!(
            LatencyBoundEstimator::default().estimate(&t),
            Err(AnalysisError::InsufficientData(_))
        ));
    }

    #[test]
    fn missing_level() {
        let t = table("L2,RAM\n10,200\n11,200\n");
        assert!(matches!(
            LatencyBoundEstimator::default().estimate(&t),
            Err(AnalysisError::Data(DataError::MissingColumn { column, .. })) if column == "L3"
        ));
    }
}
