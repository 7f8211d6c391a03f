//! I/O error types.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid file format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// A required column is absent from a TP table.
    #[error("schema mismatch: missing column(s) {}", missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },

    /// A row of a TP table could not be parsed.
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Invalid pipeline configuration.
    #[error("configuration error: {0}")]
    Json(#[from] serde_json::Error),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] tpraster_core::Error),

    /// Detector description error.
    #[error("detector error: {0}")]
    DetectorError(#[from] tpraster_detector::Error),

    /// HDF5 library error.
    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),
}

impl Error {
    /// Returns true for errors caused by the structure of an input file
    /// rather than by the environment.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::InvalidFormat(_) | Self::SchemaMismatch { .. } | Self::Parse { .. }
        )
    }
}
