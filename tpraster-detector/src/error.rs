//! Detector-description error types.

use thiserror::Error;

/// Result type for detector operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Detector-description error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Geometry name not recognised.
    #[error("unknown detector geometry: {0:?} (expected APA, CRP or 50L)")]
    UnknownGeometry(String),

    /// Plane name not recognised.
    #[error("unknown wire plane: {0:?} (expected U, V or X)")]
    UnknownPlane(String),

    /// Plane layout cannot form a channel map.
    #[error("invalid plane layout: {0}")]
    InvalidLayout(String),

    /// Threshold is not a positive finite number.
    #[error("invalid threshold for plane {plane}: {value}")]
    InvalidThreshold { plane: char, value: f64 },

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
