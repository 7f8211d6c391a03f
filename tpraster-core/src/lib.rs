//! tpraster-core: Core traits and types for trigger-primitive processing.
//!
//! This crate provides the foundational abstractions shared by the
//! clustering, waveform reconstruction, rasterization and dataset stages.
//!

pub mod clustering;
pub mod error;
pub mod image;
pub mod primitive;
pub mod truth;

pub use clustering::{
    ClosingPolicy, Cluster, ClusterSummary, ClusteringConfig, ClusteringMode, ClusteringStatistics,
    ProximityPolicy,
};
pub use error::{
    ClusterError, ClusteringError, DegenerateReason, Error, RasterError, Result, WaveformError,
};
pub use image::{ImageConfig, MetadataRow, OversizePolicy, METADATA_COLUMNS, METADATA_WIDTH};
pub use primitive::{compatible, time_compatible, Primitive, TaggedPrimitive, TriggerPrimitive};
pub use truth::{ClusterTruth, GeneratorLabel, TpTruth};
