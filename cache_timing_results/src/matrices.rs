use crate::classifiers::{Band, BandCounts, BoundaryClassifier};
use core::fmt::{Display, Formatter};
use itertools::Itertools;
#[cfg(feature = "serde_support")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mean cycles per training size, ordered by training size.
pub type TrainingSizeSeries = BTreeMap<u32, f64>;

/// Mean cycles of each (set, line), rows sorted by set index, columns by line index.
///
/// A cell is `None` when no sample was measured for that (set, line).
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct SetByLineMatrix {
    pub set_indices: Vec<u64>,
    pub line_indices: Vec<u64>,
    pub cells: Vec<Vec<Option<f64>>>,
}

/// Mean cycles per (training size, stride).
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct StrideMatrix {
    pub training_sizes: Vec<u32>,
    pub strides: Vec<u32>,
    pub cells: Vec<Vec<Option<f64>>>,
}

/// The sets around a target set, as selected for one occupancy heatmap.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct OccupancyWindow {
    pub target_set: u64,
    pub warmup_lines: u32,
    /// Inclusive range of set indices after clamping.
    pub first_set: u64,
    pub last_set: u64,
    pub matrix: SetByLineMatrix,
}

impl SetByLineMatrix {
    pub fn len(&self) -> usize {
        self.set_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set_indices.is_empty()
    }

    pub fn row(&self, set_index: u64) -> Option<&[Option<f64>]> {
        self.set_indices
            .binary_search(&set_index)
            .ok()
            .map(|i| self.cells[i].as_slice())
    }

    pub fn get(&self, set_index: u64, line_index: u64) -> Option<f64> {
        let column = self.line_indices.binary_search(&line_index).ok()?;
        self.row(set_index)?[column]
    }

    /// Rows whose set index is in `[first, last]`, as a new matrix.
    pub fn select_sets(&self, first: u64, last: u64) -> SetByLineMatrix {
        let start = self.set_indices.partition_point(|&s| s < first);
        let end = self.set_indices.partition_point(|&s| s <= last);
        let (start, end) = if start <= end { (start, end) } else { (0, 0) };
        SetByLineMatrix {
            set_indices: self.set_indices[start..end].to_vec(),
            line_indices: self.line_indices.clone(),
            cells: self.cells[start..end].to_vec(),
        }
    }

    /// Every measured cell, row by row.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.cells.iter().flatten().filter_map(|c| *c)
    }

    /// Classifies every measured cell.
    pub fn classify(&self, classifier: &BoundaryClassifier) -> Vec<Vec<Option<Band>>> {
        self.cells
            .iter()
            .map(|row| row.iter().map(|c| c.map(|v| classifier.classify(v))).collect())
            .collect()
    }

    pub fn band_counts(&self, classifier: &BoundaryClassifier) -> BandCounts {
        classifier.count(self.values())
    }
}

impl Display for StrideMatrix {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        writeln!(
            f,
            "{:>12} {}",
            "TrainingSize",
            self.strides.iter().map(|s| format!("{:>8}", s)).join(" ")
        )?;
        for (training_size, row) in self.training_sizes.iter().zip(&self.cells) {
            let mut cells = row.iter().map(|cell| match cell {
                Some(v) => format!("{:>8.2}", v),
                None => format!("{:>8}", "NaN"),
            });
            writeln!(f, "{:>12} {}", training_size, cells.join(" "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> SetByLineMatrix {
        SetByLineMatrix {
            set_indices: vec![2, 3, 5, 8],
            line_indices: vec![0, 1],
            cells: vec![
                vec![Some(10.0), Some(20.0)],
                vec![Some(30.0), None],
                vec![Some(50.0), Some(60.0)],
                vec![Some(80.0), Some(90.0)],
            ],
        }
    }

    #[test]
    fn select() {
        let m = matrix();
        let selected = m.select_sets(3, 7);
        assert_eq!(selected.set_indices, vec![3, 5]);
        assert_eq!(selected.cells[0], vec![Some(30.0), None]);
        assert_eq!(m.select_sets(9, 20).len(), 0);
        assert_eq!(m.select_sets(7, 3).len(), 0);
        assert_eq!(m.select_sets(0, 100), m);
    }

    #[test]
    fn lookup_and_classify() {
        let m = matrix();
        assert_eq!(m.get(5, 1), Some(60.0));
        assert_eq!(m.get(3, 1), None);
        assert_eq!(m.get(4, 0), None);
        let checker = BoundaryClassifier::new(25.0, 60.0).unwrap();
        let bands = m.classify(&checker);
        assert_eq!(bands[0], vec![Some(Band::Below), Some(Band::Below)]);
        assert_eq!(bands[1], vec![Some(Band::Within), None]);
        assert_eq!(
            m.band_counts(&checker),
            BandCounts {
                below: 2,
                within: 3,
                above: 2
            }
        );
    }

    #[test]
    fn stride_table() {
        let m = StrideMatrix {
            training_sizes: vec![0, 1],
            strides: vec![4, 2],
            cells: vec![vec![Some(1.0), None], vec![Some(3.0), Some(4.0)]],
        };
        let printed = m.to_string();
        assert!(printed.starts_with("TrainingSize"));
        let lines: Vec<&str> = printed.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].ends_with("3.00     4.00"));
        assert!(printed.contains("NaN"));
    }
}
