//! Error types for tpraster-core.

use thiserror::Error;

/// Result type alias for tpraster operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for tpraster operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A trigger primitive failed validation at construction.
    #[error("invalid trigger primitive: {0}")]
    InvalidPrimitive(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// An image does not match the dataset's image shape.
    #[error("image shape {found:?} does not match dataset shape {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// Clustering error.
    #[error("clustering error: {0}")]
    Clustering(#[from] ClusteringError),

    /// Per-cluster processing error.
    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),
}

/// Errors raised by the clusterer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusteringError {
    /// Input was not sorted by ascending `time_start`.
    #[error("input not sorted by time_start at index {index} ({previous} > {current})")]
    UnsortedInput {
        index: usize,
        previous: i64,
        current: i64,
    },

    /// Invalid clustering parameters.
    #[error("invalid clustering configuration: {0}")]
    InvalidConfig(String),
}

/// Why a pentagon waveform could not be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegenerateReason {
    /// `adc_peak <= threshold`.
    PeakBelowThreshold,
    /// `time_end <= time_start`.
    ZeroDuration,
    /// A non-finite value reached the reconstruction.
    NonFinite,
}

impl std::fmt::Display for DegenerateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PeakBelowThreshold => write!(f, "peak amplitude at or below threshold"),
            Self::ZeroDuration => write!(f, "zero-duration window"),
            Self::NonFinite => write!(f, "non-finite input"),
        }
    }
}

/// Waveform reconstruction errors. Non-fatal: the rasterizer absorbs them.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum WaveformError {
    /// The pentagon shape is degenerate.
    #[error("degenerate waveform ({reason}): peak={adc_peak}, threshold={threshold}")]
    Degenerate {
        reason: DegenerateReason,
        adc_peak: f64,
        threshold: f64,
    },
}

/// Rasterization errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RasterError {
    /// Cluster extent exceeds the target image and the policy rejects it.
    #[error(
        "cluster extent {channels}x{ticks} (channels x ticks) exceeds image {width}x{height}"
    )]
    ClusterTooLarge {
        channels: usize,
        ticks: usize,
        width: usize,
        height: usize,
    },
}

/// Per-cluster errors aggregated by the dataset builder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    /// Cluster has fewer members than required.
    #[error("cluster has {len} trigger primitives, need at least {min}")]
    TooSmall { len: usize, min: usize },

    /// Cluster lies on a plane excluded by the dataset configuration.
    #[error("cluster on plane {plane} excluded")]
    PlaneExcluded { plane: u8 },

    /// Rasterization failed.
    #[error(transparent)]
    Raster(#[from] RasterError),
}

impl ClusterError {
    /// Returns true for expected filtering outcomes that are not worth a warning.
    #[must_use]
    pub fn is_filter(&self) -> bool {
        matches!(self, Self::TooSmall { .. } | Self::PlaneExcluded { .. })
    }
}
