use crate::render::RenderError;
#[cfg(feature = "serde_support")]
use cache_timing_results::archive::ArchiveError;
use cache_timing_results::errors::{ConfigurationError, InsufficientDataError};
use cache_timing_results::tables::DataError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    InsufficientData(#[from] InsufficientDataError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[cfg(feature = "serde_support")]
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}
