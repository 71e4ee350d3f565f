/**
 * Loading of the CSV files written by the measurement programs.
 *
 * All files start with a header row naming the columns, then one measurement per line.
 * Empty lines and lines starting with `#` are ignored. Cycle counts must be non-negative numbers,
 * indices must be non-negative integers (`12` and `12.0` are both accepted).
 */
#[cfg(feature = "serde_support")]
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const TRAINING_SIZE_COLUMN: &str = "TrainingSize";
pub const CYCLES_COLUMN: &str = "Cycles";
pub const ITERATION_COLUMN: &str = "Iteration";
/// The measurement program calls the timed set `SPrime` and the timed line `LPrime`.
pub const SET_INDEX_COLUMNS: [&str; 2] = ["SetIndex", "SPrime"];
pub const LINE_INDEX_COLUMNS: [&str; 2] = ["LineIndex", "LPrime"];

#[derive(Debug, Error)]
pub enum DataError {
    #[error("missing input file: {}", path.display())]
    MissingInput { path: PathBuf },
    #[error("failed to read {}: {error}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("{origin}: no header row")]
    MissingHeader { origin: String },
    #[error("{origin}:{line}: expected {expected} columns, got {got}")]
    ColumnCount {
        origin: String,
        line: usize,
        expected: usize,
        got: usize,
    },
    #[error("{origin}:{line}: invalid value '{value}' in column {column}")]
    InvalidValue {
        origin: String,
        line: usize,
        column: String,
        value: String,
    },
    #[error("{origin}: missing column {column} (found {found:?})")]
    MissingColumn {
        origin: String,
        column: String,
        found: Vec<String>,
    },
}

/// Open a file, mapping an absent file to `DataError::MissingInput`.
pub fn open_input(path: &Path) -> Result<BufReader<File>, DataError> {
    match File::open(path) {
        Ok(file) => Ok(BufReader::new(file)),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(DataError::MissingInput {
            path: path.to_path_buf(),
        }),
        Err(error) => Err(DataError::Io {
            path: path.to_path_buf(),
            error,
        }),
    }
}

// Raw records, with their (1-indexed) line number for error reporting.
struct CsvRecords {
    origin: String,
    header: Vec<String>,
    records: Vec<(usize, Vec<String>)>,
}

impl CsvRecords {
    fn parse(reader: impl BufRead, origin: &str) -> Result<Self, DataError> {
        let mut header: Option<Vec<String>> = None;
        let mut records = Vec::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result.map_err(|error| DataError::Io {
                path: PathBuf::from(origin),
                error,
            })?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<String> = line.split(',').map(|f| f.trim().to_string()).collect();
            match &header {
                None => header = Some(fields),
                Some(h) => {
                    if fields.len() != h.len() {
                        return Err(DataError::ColumnCount {
                            origin: origin.to_string(),
                            line: line_num + 1,
                            expected: h.len(),
                            got: fields.len(),
                        });
                    }
                    records.push((line_num + 1, fields));
                }
            }
        }

        let header = header.ok_or_else(|| DataError::MissingHeader {
            origin: origin.to_string(),
        })?;
        Ok(Self {
            origin: origin.to_string(),
            header,
            records,
        })
    }

    fn column(&self, names: &[&str]) -> Result<usize, DataError> {
        names
            .iter()
            .find_map(|name| self.header.iter().position(|h| h == name))
            .ok_or_else(|| DataError::MissingColumn {
                origin: self.origin.clone(),
                column: names.join("|"),
                found: self.header.clone(),
            })
    }

    fn invalid(&self, line: usize, column: usize, value: &str) -> DataError {
        DataError::InvalidValue {
            origin: self.origin.clone(),
            line,
            column: self.header[column].clone(),
            value: value.to_string(),
        }
    }

    fn cycles(&self, line: usize, record: &[String], column: usize) -> Result<f64, DataError> {
        let raw = &record[column];
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
            _ => Err(self.invalid(line, column, raw)),
        }
    }

    fn index(&self, line: usize, record: &[String], column: usize) -> Result<u64, DataError> {
        let raw = &record[column];
        if let Ok(v) = raw.parse::<u64>() {
            return Ok(v);
        }
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64 => {
                Ok(v as u64)
            }
            _ => Err(self.invalid(line, column, raw)),
        }
    }
}

/// Timing dataset, one column per memory level, one row per trial.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct TimingTable {
    origin: String,
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl TimingTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let path = path.as_ref();
        Self::parse(open_input(path)?, &path.display().to_string())
    }

    pub fn parse(reader: impl BufRead, origin: &str) -> Result<Self, DataError> {
        let csv = CsvRecords::parse(reader, origin)?;
        let mut rows = Vec::with_capacity(csv.records.len());
        for (line, record) in &csv.records {
            let row = (0..record.len())
                .map(|column| csv.cycles(*line, record, column))
                .collect::<Result<Vec<f64>, DataError>>()?;
            rows.push(row);
        }
        Ok(Self {
            origin: csv.origin,
            columns: csv.header,
            rows,
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize, DataError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| DataError::MissingColumn {
                origin: self.origin.clone(),
                column: name.to_string(),
                found: self.columns.clone(),
            })
    }

    pub fn column(&self, name: &str) -> Result<Vec<f64>, DataError> {
        let index = self.column_index(name)?;
        Ok(self.rows.iter().map(|row| row[index]).collect())
    }

    /// A new table with only the rows for which `keep` holds.
    pub fn filter_rows(&self, keep: impl Fn(&[f64]) -> bool) -> TimingTable {
        TimingTable {
            origin: self.origin.clone(),
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| keep(row))
                .cloned()
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct TrainingSizeSample {
    pub training_size: u32,
    pub cycles: f64,
}

pub fn load_training_size_samples(
    path: impl AsRef<Path>,
) -> Result<Vec<TrainingSizeSample>, DataError> {
    let path = path.as_ref();
    parse_training_size_samples(open_input(path)?, &path.display().to_string())
}

pub fn parse_training_size_samples(
    reader: impl BufRead,
    origin: &str,
) -> Result<Vec<TrainingSizeSample>, DataError> {
    let csv = CsvRecords::parse(reader, origin)?;
    let training_size_column = csv.column(&[TRAINING_SIZE_COLUMN])?;
    let cycles_column = csv.column(&[CYCLES_COLUMN])?;

    csv.records
        .iter()
        .map(|(line, record)| -> Result<TrainingSizeSample, DataError> {
            let training_size = csv.index(*line, record, training_size_column)?;
            let training_size = u32::try_from(training_size).map_err(|_| {
                csv.invalid(*line, training_size_column, &record[training_size_column])
            })?;
            Ok(TrainingSizeSample {
                training_size,
                cycles: csv.cycles(*line, record, cycles_column)?,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct OccupancySample {
    pub iteration: u64,
    pub set_index: u64,
    pub line_index: u64,
    pub cycles: f64,
}

/// Occupancy profile of the sets around one target set.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct OccupancyTable {
    pub origin: String,
    pub samples: Vec<OccupancySample>,
}

impl OccupancyTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let path = path.as_ref();
        Self::parse(open_input(path)?, &path.display().to_string())
    }

    pub fn parse(reader: impl BufRead, origin: &str) -> Result<Self, DataError> {
        let csv = CsvRecords::parse(reader, origin)?;
        let iteration_column = csv.column(&[ITERATION_COLUMN])?;
        let set_column = csv.column(&SET_INDEX_COLUMNS)?;
        let line_column = csv.column(&LINE_INDEX_COLUMNS)?;
        let cycles_column = csv.column(&[CYCLES_COLUMN])?;

        let samples = csv
            .records
            .iter()
            .map(|(line, record)| -> Result<OccupancySample, DataError> {
                Ok(OccupancySample {
                    iteration: csv.index(*line, record, iteration_column)?,
                    set_index: csv.index(*line, record, set_column)?,
                    line_index: csv.index(*line, record, line_column)?,
                    cycles: csv.cycles(*line, record, cycles_column)?,
                })
            })
            .collect::<Result<Vec<_>, DataError>>()?;

        Ok(Self {
            origin: csv.origin,
            samples,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_table() {
        let data = "L1,L2,L3,RAM\n\n# warm\n4,12,48,210\n5, 13 ,50,190\n";
        let table = TimingTable::parse(data.as_bytes(), "timing.csv").unwrap();
        assert_eq!(table.columns(), ["L1", "L2", "L3", "RAM"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.column("L2").unwrap(), vec![12.0, 13.0]);
        let filtered = table.filter_rows(|row| row[3] < 200.0);
        assert_eq!(filtered.rows(), [vec![5.0, 13.0, 50.0, 190.0]]);
        // The source table is untouched.
        assert_eq!(table.len(), 2);
        assert!(matches!(
            table.column("L4"),
            Err(DataError::MissingColumn { column, .. }) if column == "L4"
        ));
    }

    #[test]
    fn rejects_negative_and_garbage() {
        let err = TimingTable::parse("L2,RAM\n3,-4\n".as_bytes(), "t").unwrap_err();
        assert!(matches!(
            err,
            DataError::InvalidValue { line: 2, ref column, .. } if column == "RAM"
        ));
        let err = TimingTable::parse("L2,RAM\n3,abc\n".as_bytes(), "t").unwrap_err();
        assert!(matches!(err, DataError::InvalidValue { .. }));
        let err = TimingTable::parse("L2,RAM\n3\n".as_bytes(), "t").unwrap_err();
        assert!(matches!(
            err,
            DataError::ColumnCount {
                expected: 2,
                got: 1,
                ..
            }
        ));
        let err = TimingTable::parse("\n# nothing\n".as_bytes(), "t").unwrap_err();
        assert!(matches!(err, DataError::MissingHeader { .. }));
    }

    #[test]
    fn training_size_samples() {
        let data = "TrainingSize,Cycles\n0,10\n0,20\n1.0,30\n";
        let samples = parse_training_size_samples(data.as_bytes(), "next_line.csv").unwrap();
        assert_eq!(
            samples,
            vec![
                TrainingSizeSample {
                    training_size: 0,
                    cycles: 10.0
                },
                TrainingSizeSample {
                    training_size: 0,
                    cycles: 20.0
                },
                TrainingSizeSample {
                    training_size: 1,
                    cycles: 30.0
                },
            ]
        );
        let err = parse_training_size_samples("TrainingSize,Cycles\n1.5,3\n".as_bytes(), "n")
            .unwrap_err();
        assert!(matches!(err, DataError::InvalidValue { .. }));
    }

    #[test]
    fn occupancy_aliases() {
        let named = "Iteration,SetIndex,LineIndex,Cycles\n0,3,1,120\n";
        let produced = "Set,Iteration,SPrime,LPrime,Cycles\n7,0,3,1,120\n";
        let a = OccupancyTable::parse(named.as_bytes(), "a").unwrap();
        let b = OccupancyTable::parse(produced.as_bytes(), "b").unwrap();
        assert_eq!(a.samples, b.samples);
        assert_eq!(
            a.samples[0],
            OccupancySample {
                iteration: 0,
                set_index: 3,
                line_index: 1,
                cycles: 120.0
            }
        );
    }

    #[test]
    fn missing_file() {
        let err = TimingTable::load("/nonexistent/results/timing.csv").unwrap_err();
        assert!(matches!(err, DataError::MissingInput { .. }));
    }
}
