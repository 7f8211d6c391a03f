//! tpraster-algorithms: Clustering and image building for trigger primitives.
//!
//! This crate provides the processing stages:
//! - **Proximity clustering** - single forward scan over time-sorted TPs
//! - **Pentagon waveforms** - fixed-fraction or area-matched reconstruction
//! - **Rasterization** - fixed-size channel x time images, max-combined
//! - **Dataset building** - parallel per-cluster rendering, ordered output
//!
#![warn(missing_docs)]

mod clusterer;
mod dataset;
pub mod raster;
pub mod waveform;

pub use clusterer::{cluster_tps, ClusterState, ProximityClustering};
pub use dataset::{
    BuildReport, ClusterImage, Dataset, DatasetAccumulator, DatasetBuilder, DatasetConfig,
};
pub use raster::{normalize_by_max, ImageRasterizer, RasterOutput};
pub use waveform::{minimize_bounded, polygon_area, PentagonWaveform, WaveformModel};

// Re-export core clustering types
pub use tpraster_core::clustering::{
    ClosingPolicy, ClusteringConfig, ClusteringMode, ClusteringStatistics, ProximityPolicy,
};
