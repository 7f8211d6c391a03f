//! Clustering traits and types.

use crate::error::ClusteringError;
use crate::primitive::{Primitive, TriggerPrimitive};
use crate::truth::ClusterTruth;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A cluster of trigger primitives judged to come from one energy deposit.
///
/// Members are kept in discovery order, which is not necessarily sorted by
/// time across the whole set.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cluster<P = TriggerPrimitive> {
    /// Trigger primitives belonging to this cluster.
    pub tps: Vec<P>,
}

impl<P> Cluster<P> {
    /// Creates an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self { tps: Vec::new() }
    }

    /// Creates a cluster with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tps: Vec::with_capacity(capacity),
        }
    }

    /// Adds a trigger primitive to the cluster.
    pub fn push(&mut self, tp: P) {
        self.tps.push(tp);
    }

    /// Returns the number of trigger primitives in the cluster.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tps.len()
    }

    /// Returns true if the cluster is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tps.is_empty()
    }

    /// Returns an iterator over the members.
    pub fn iter(&self) -> impl Iterator<Item = &P> {
        self.tps.iter()
    }
}

impl<P: Primitive> Cluster<P> {
    /// Truth summary of the members, if any carry truth.
    #[must_use]
    pub fn truth(&self) -> Option<ClusterTruth> {
        ClusterTruth::from_members(&self.tps)
    }

    /// Summary statistics for text dumps.
    #[must_use]
    pub fn summary(&self) -> Option<ClusterSummary> {
        let first = self.tps.first()?.tp();
        let mut summary = ClusterSummary {
            n_tps: self.tps.len(),
            channel_min: first.channel,
            channel_max: first.channel,
            time_min: first.time_start,
            time_max: first.time_end(),
            total_adc_integral: 0.0,
            max_adc_peak: 0.0,
        };
        for tp in self.tps.iter().map(Primitive::tp) {
            summary.channel_min = summary.channel_min.min(tp.channel);
            summary.channel_max = summary.channel_max.max(tp.channel);
            summary.time_min = summary.time_min.min(tp.time_start);
            summary.time_max = summary.time_max.max(tp.time_end());
            summary.total_adc_integral += tp.adc_integral;
            summary.max_adc_peak = summary.max_adc_peak.max(tp.adc_peak);
        }
        Some(summary)
    }
}

impl<P> FromIterator<P> for Cluster<P> {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self {
            tps: iter.into_iter().collect(),
        }
    }
}

/// Bounding-box and charge summary of a cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusterSummary {
    pub n_tps: usize,
    pub channel_min: u32,
    pub channel_max: u32,
    pub time_min: i64,
    pub time_max: i64,
    pub total_adc_integral: f64,
    pub max_adc_peak: f64,
}

/// How an incoming TP is tested against an open buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ProximityPolicy {
    /// Adjacent to the most recently added member only. Long tracks may
    /// drift far from their first member.
    #[default]
    Chained,
    /// Chained adjacency, and the cluster's overall extent including the new
    /// TP must stay strictly below `max_ticks` x `max_channels`.
    BoundingBox { max_ticks: i64, max_channels: i64 },
}

/// When an open buffer stops accepting TPs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ClosingPolicy {
    /// Every buffer the incoming TP does not extend is closed.
    #[default]
    Unextended,
    /// A buffer stays open while the incoming TP is within `tick_limit` of
    /// its last member, even if the channel test fails. Interleaved tracks
    /// far apart in channel then survive each other.
    TimeWindow,
}

/// Configuration for the clusterer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClusteringConfig {
    /// Strict upper bound on the tick distance between adjacent TPs.
    pub tick_limit: i64,
    /// Strict upper bound on the channel distance between adjacent TPs.
    pub channel_limit: i64,
    /// Minimum number of TPs to form a valid cluster.
    pub min_tps: usize,
    /// Membership policy.
    pub policy: ProximityPolicy,
    /// Buffer closing rule.
    pub closing: ClosingPolicy,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            tick_limit: 3,
            channel_limit: 1,
            min_tps: 1,
            policy: ProximityPolicy::Chained,
            closing: ClosingPolicy::Unextended,
        }
    }
}

impl ClusteringConfig {
    /// Creates a new clustering configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tick limit.
    #[must_use]
    pub fn with_tick_limit(mut self, ticks: i64) -> Self {
        self.tick_limit = ticks;
        self
    }

    /// Sets the channel limit.
    #[must_use]
    pub fn with_channel_limit(mut self, channels: i64) -> Self {
        self.channel_limit = channels;
        self
    }

    /// Sets the minimum cluster size.
    #[must_use]
    pub fn with_min_tps(mut self, min_tps: usize) -> Self {
        self.min_tps = min_tps;
        self
    }

    /// Sets the membership policy.
    #[must_use]
    pub fn with_policy(mut self, policy: ProximityPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the buffer closing rule.
    #[must_use]
    pub fn with_closing(mut self, closing: ClosingPolicy) -> Self {
        self.closing = closing;
        self
    }

    /// Checks the limits describe a usable adjacency rule.
    ///
    /// # Errors
    /// Returns [`ClusteringError::InvalidConfig`] for negative limits or a
    /// bounding box that is not strictly positive.
    pub fn validate(&self) -> Result<(), ClusteringError> {
        if self.tick_limit < 0 || self.channel_limit < 0 {
            return Err(ClusteringError::InvalidConfig(format!(
                "tick_limit and channel_limit must be >= 0, got {} and {}",
                self.tick_limit, self.channel_limit
            )));
        }
        if let ProximityPolicy::BoundingBox {
            max_ticks,
            max_channels,
        } = self.policy
        {
            if max_ticks <= 0 || max_channels <= 0 {
                return Err(ClusteringError::InvalidConfig(format!(
                    "bounding box must be positive, got {max_ticks} ticks x {max_channels} channels"
                )));
            }
        }
        Ok(())
    }
}

/// Which adjacency rule a clustering pass actually applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ClusteringMode {
    /// Tick and channel adjacency.
    #[default]
    TimeAndChannel,
    /// Channel adjacency ignored because the input spans several planes.
    TimeOnly,
}

/// Statistics from a clustering pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusteringStatistics {
    /// Number of TPs processed.
    pub tps_processed: usize,
    /// Number of clusters emitted.
    pub clusters_found: usize,
    /// Buffers closed below the minimum size.
    pub buffers_dropped: usize,
    /// TPs appended to more than one open buffer.
    pub shared_tps: usize,
    /// Rule used by the most recent pass.
    pub mode: ClusteringMode,
}
