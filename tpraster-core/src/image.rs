//! Image geometry and per-image metadata layout.
#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]

use crate::truth::ClusterTruth;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What to do with a cluster whose raw extent exceeds the target image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum OversizePolicy {
    /// Centre the cluster and drop pixels that fall outside.
    #[default]
    Clip,
    /// Refuse to rasterize; the caller excludes the cluster.
    Reject,
}

/// Target image shape. Rows are time ticks, columns are channels.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ImageConfig {
    /// Number of channel columns.
    pub width: usize,
    /// Number of time rows.
    pub height: usize,
    /// Ticks of zero padding sampled before `time_start` and after `time_end`.
    pub time_margin: i64,
    /// Oversize handling.
    pub oversize: OversizePolicy,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            width: 32,
            height: 32,
            time_margin: 1,
            oversize: OversizePolicy::Clip,
        }
    }
}

impl ImageConfig {
    /// Creates an image configuration of the given shape.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Sets the time margin.
    #[must_use]
    pub fn with_time_margin(mut self, margin: i64) -> Self {
        self.time_margin = margin.max(0);
        self
    }

    /// Sets the oversize policy.
    #[must_use]
    pub fn with_oversize(mut self, policy: OversizePolicy) -> Self {
        self.oversize = policy;
        self
    }

    /// Pixels per image.
    #[must_use]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    /// Returns true if the image has no pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Number of metadata columns per image.
pub const METADATA_WIDTH: usize = 12;

/// Column names of a metadata row, in order.
pub const METADATA_COLUMNS: [&str; METADATA_WIDTH] = [
    "is_signal",
    "is_main_track",
    "true_x",
    "true_y",
    "true_z",
    "true_dir_x",
    "true_dir_y",
    "true_dir_z",
    "true_neutrino_energy",
    "true_particle_energy",
    "plane_id",
    "interaction_type",
];

/// Sentinel written where the source carries no truth.
pub const MISSING: f32 = -1.0;

/// Fixed-layout metadata vector describing one image.
///
/// Flags default to `0`, continuous truth to [`MISSING`]. `plane_id` is
/// always filled from the channel map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetadataRow(pub [f32; METADATA_WIDTH]);

impl MetadataRow {
    /// Builds the row for a cluster.
    #[must_use]
    pub fn new(truth: Option<&ClusterTruth>, plane_id: u8) -> Self {
        let mut row = [MISSING; METADATA_WIDTH];
        row[0] = 0.0;
        row[1] = 0.0;
        row[10] = f32::from(plane_id);

        if let Some(truth) = truth {
            let k = &truth.kinematics;
            row[0] = if truth.true_label.is_signal() { 1.0 } else { 0.0 };
            row[1] = if truth.is_main_track { 1.0 } else { 0.0 };
            if let Some(pos) = k.position {
                for (dst, v) in row[2..5].iter_mut().zip(pos) {
                    *dst = v as f32;
                }
            }
            if let Some(dir) = k.direction {
                for (dst, v) in row[5..8].iter_mut().zip(dir) {
                    *dst = v as f32;
                }
            }
            if let Some(e) = k.neutrino_energy {
                row[8] = e as f32;
            }
            if let Some(e) = k.particle_energy {
                row[9] = e as f32;
            }
            if let Some(kind) = k.interaction_type {
                row[11] = kind as f32;
            }
        }
        Self(row)
    }

    /// Returns the row as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}
