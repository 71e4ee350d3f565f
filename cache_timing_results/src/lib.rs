#![deny(unsafe_op_in_unsafe_fn)]

/**
 * Data model shared by the cache timing analyses.
 *
 * Raw measurements are CSV tables produced by the measurement programs (timing of each
 * cache level, next line / stride prefetcher timings, occupancy of the sets around a target).
 * Everything derived from them (bounds, series, matrices) lives here too, so that analysis
 * results can be stored and reloaded off-line.
 */
#[cfg(feature = "serde_support")]
pub mod archive;
pub mod classifiers;
pub mod errors;
pub mod histograms;
pub mod matrices;
pub mod statistics;
pub mod tables;

/// Number of sets of the profiled cache (L2, 512 sets of 8 ways).
pub const NUM_SETS: u64 = 512;
/// Largest valid set index.
pub const MAX_SET_INDEX: u64 = NUM_SETS - 1;
