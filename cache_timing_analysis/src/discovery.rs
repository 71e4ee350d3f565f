/**
 * Discovery of the occupancy measurements in a results directory.
 *
 * The measurement program names its files `<warmup>..._O1_CPU4_S<target set>...`, the warmup
 * prefix being absent when no line was warmed up.
 */
use cache_timing_results::tables::DataError;
use regex::Regex;
#[cfg(feature = "serde_support")]
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

static OCCUPANCY_FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)?.*_O1_CPU4_S([0-9]+)").expect("occupancy file name pattern is valid")
});

/// One occupancy measurement file.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct OccupancyInput {
    pub path: PathBuf,
    pub warmup_lines: u32,
    pub target_set: u64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("malformed occupancy file name: {name}")]
pub struct MalformedFilenameError {
    pub name: String,
}

/// Warmup line count and target set encoded in a file name.
pub fn parse_occupancy_file_name(name: &str) -> Result<(u32, u64), MalformedFilenameError> {
    let malformed = || MalformedFilenameError {
        name: name.to_string(),
    };
    let captures = OCCUPANCY_FILE_NAME.captures(name).ok_or_else(malformed)?;
    let warmup_lines = match captures.get(1) {
        Some(m) => m.as_str().parse().map_err(|_| malformed())?,
        None => 0,
    };
    let target_set = captures[2].parse().map_err(|_| malformed())?;
    Ok((warmup_lines, target_set))
}

impl OccupancyInput {
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, MalformedFilenameError> {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (warmup_lines, target_set) = parse_occupancy_file_name(&name)?;
        Ok(Self {
            path,
            warmup_lines,
            target_set,
        })
    }

    /// Base name of the artifacts derived from this input.
    pub fn artifact_name(&self) -> String {
        format!("s{}_w{}", self.target_set, self.warmup_lines)
    }
}

/// Every occupancy file of `dir`, sorted by file name.
///
/// Files with a name that does not follow the naming scheme are skipped with a warning.
pub fn discover_occupancy_inputs(dir: impl AsRef<Path>) -> Result<Vec<OccupancyInput>, DataError> {
    let dir = dir.as_ref();
    let io_error = |error: std::io::Error| {
        if error.kind() == ErrorKind::NotFound {
            DataError::MissingInput {
                path: dir.to_path_buf(),
            }
        } else {
            DataError::Io {
                path: dir.to_path_buf(),
                error,
            }
        }
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        if entry.file_type().map_err(io_error)?.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort();

    let mut inputs = Vec::with_capacity(paths.len());
    for path in paths {
        match OccupancyInput::from_path(&path) {
            Ok(input) => inputs.push(input),
            Err(e) => tracing::warn!(path = %path.display(), "skipping file: {}", e),
        }
    }
    tracing::debug!(dir = %dir.display(), count = inputs.len(), "discovered occupancy inputs");
    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names() {
        assert_eq!(
            parse_occupancy_file_name("8_occupancy_O1_CPU4_S12.csv"),
            Ok((8, 12))
        );
        assert_eq!(
            parse_occupancy_file_name("occupancy_O1_CPU4_S511.csv"),
            Ok((0, 511))
        );
        assert_eq!(parse_occupancy_file_name("16_O1_CPU4_S0"), Ok((16, 0)));
        assert!(parse_occupancy_file_name("occupancy_O2_CPU4_S12.csv").is_err());
        assert!(parse_occupancy_file_name("timing.csv").is_err());
        assert!(parse_occupancy_file_name("99999999999_x_O1_CPU4_S1.csv").is_err());
    }

    #[test]
    fn artifact_names() {
        let input = OccupancyInput::from_path("results/occupancy/4_occ_O1_CPU4_S300.csv").unwrap();
        assert_eq!(input.warmup_lines, 4);
        assert_eq!(input.target_set, 300);
        assert_eq!(input.artifact_name(), "s300_w4");
    }

    #[test]
    fn skips_malformed_names() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "2_run_O1_CPU4_S40.csv",
            "run_O1_CPU4_S7.csv",
            "notes.txt",
            "run_O3_CPU4_S7.csv",
        ] {
            std::fs::write(dir.path().join(name), "Iteration,SetIndex,LineIndex,Cycles\n").unwrap();
        }
        std::fs::create_dir(dir.path().join("1_nested_O1_CPU4_S1")).unwrap();

        let inputs = discover_occupancy_inputs(dir.path()).unwrap();
        let found: Vec<(u32, u64)> = inputs
            .iter()
            .map(|i| (i.warmup_lines, i.target_set))
            .collect();
        assert_eq!(found, vec![(2, 40), (0, 7)]);
    }

    #[test]
    fn missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover_occupancy_inputs(dir.path().join("absent")),
            Err(DataError::MissingInput { .. })
        ));
    }
}
