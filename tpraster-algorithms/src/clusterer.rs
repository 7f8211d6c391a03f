//! Proximity clustering of time-ordered trigger primitives.
//!
//! Single forward scan over TPs sorted by `time_start`:
//! - Each open buffer remembers its most recently added member.
//! - An incoming TP joins every open buffer whose last member is adjacent
//!   (tick and channel distance strictly below the limits).
//! - Buffers the TP did not extend are closed ([`ClosingPolicy::Unextended`]),
//!   or only once the TP is too far in time from their last member
//!   ([`ClosingPolicy::TimeWindow`]). Closed buffers with at least `min_tps`
//!   members are emitted, smaller ones are dropped.
//! - A TP joining no buffer seeds a new one.
//!
//! Under `TimeWindow` several buffers can be open at once and a TP may join
//! more than one of them; membership is then shared between clusters.
//!
//! If the input spans several wire planes, channel numbers are not
//! comparable and the pass falls back to time-only adjacency.

use log::{debug, warn};
use tpraster_core::clustering::{
    ClosingPolicy, Cluster, ClusteringConfig, ClusteringMode, ClusteringStatistics,
    ProximityPolicy,
};
use tpraster_core::error::ClusteringError;
use tpraster_core::primitive::{compatible, time_compatible, Primitive};
use tpraster_detector::ChannelMap;

/// Open candidate cluster.
#[derive(Clone, Debug)]
struct Buffer {
    /// Indices of member TPs, in discovery order.
    indices: Vec<usize>,
    /// Bounding box over member start times and channels.
    t_min: i64,
    t_max: i64,
    ch_min: i64,
    ch_max: i64,
}

impl Buffer {
    fn seed<P: Primitive>(idx: usize, tp: &P) -> Self {
        let t = tp.time_start();
        let ch = i64::from(tp.channel());
        let mut indices = Vec::with_capacity(8);
        indices.push(idx);
        Self {
            indices,
            t_min: t,
            t_max: t,
            ch_min: ch,
            ch_max: ch,
        }
    }

    #[inline]
    fn last(&self) -> usize {
        // Buffers are never empty: seeded with one index, only ever grow.
        self.indices[self.indices.len() - 1]
    }

    fn add<P: Primitive>(&mut self, idx: usize, tp: &P) {
        self.indices.push(idx);
        let t = tp.time_start();
        let ch = i64::from(tp.channel());
        self.t_min = self.t_min.min(t);
        self.t_max = self.t_max.max(t);
        self.ch_min = self.ch_min.min(ch);
        self.ch_max = self.ch_max.max(ch);
    }

    /// Extent check for [`ProximityPolicy::BoundingBox`].
    fn fits_box<P: Primitive>(&self, tp: &P, max_ticks: i64, max_channels: Option<i64>) -> bool {
        let t = tp.time_start();
        let ticks = self.t_max.max(t) - self.t_min.min(t);
        if ticks >= max_ticks {
            return false;
        }
        match max_channels {
            Some(limit) => {
                let ch = i64::from(tp.channel());
                self.ch_max.max(ch) - self.ch_min.min(ch) < limit
            }
            None => true,
        }
    }
}

/// Clustering state, reusable across passes.
#[derive(Default)]
pub struct ClusterState {
    open: Vec<Buffer>,
    statistics: ClusteringStatistics,
}

impl ClusterState {
    /// Clears buffers and statistics.
    pub fn reset(&mut self) {
        self.open.clear();
        self.statistics = ClusteringStatistics::default();
    }
}

/// Forward-scan proximity clusterer.
#[derive(Clone, Debug, Default)]
pub struct ProximityClustering {
    config: ClusteringConfig,
}

impl ProximityClustering {
    /// Create with custom configuration.
    #[must_use]
    pub fn new(config: ClusteringConfig) -> Self {
        Self { config }
    }

    /// Algorithm name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self.config.policy {
            ProximityPolicy::Chained => "ChainedProximity",
            ProximityPolicy::BoundingBox { .. } => "BoundingBoxProximity",
        }
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    /// Replace the configuration.
    pub fn configure(&mut self, config: ClusteringConfig) {
        self.config = config;
    }

    /// Statistics accumulated in `state` since its last reset.
    #[must_use]
    pub fn statistics(&self, state: &ClusterState) -> ClusteringStatistics {
        state.statistics.clone()
    }

    /// Clusters `tps`, which must be sorted by ascending `time_start`.
    ///
    /// Empty input yields no clusters. The channel map is only used to detect
    /// multi-plane input.
    ///
    /// # Errors
    /// Returns [`ClusteringError::InvalidConfig`] if the configuration fails
    /// [`ClusteringConfig::validate`], and [`ClusteringError::UnsortedInput`]
    /// if the time-ordering precondition is violated.
    pub fn cluster<P: Primitive + Clone>(
        &self,
        tps: &[P],
        channel_map: &ChannelMap,
        state: &mut ClusterState,
    ) -> Result<Vec<Cluster<P>>, ClusteringError> {
        self.config.validate()?;
        state.open.clear();
        if tps.is_empty() {
            debug!("clustering invoked on zero trigger primitives");
            return Ok(Vec::new());
        }
        check_sorted(tps)?;

        let mode = if channel_map.spans_multiple_planes(tps.iter().map(Primitive::channel)) {
            warn!(
                "{} trigger primitives span several planes; falling back to time-only clustering",
                tps.len()
            );
            ClusteringMode::TimeOnly
        } else {
            ClusteringMode::TimeAndChannel
        };
        state.statistics.mode = mode;

        let mut clusters = Vec::new();
        let mut still_open = Vec::new();

        for (idx, tp) in tps.iter().enumerate() {
            let mut joined = 0usize;
            still_open.clear();

            for mut buffer in state.open.drain(..) {
                let last = &tps[buffer.last()];
                if self.accepts(&buffer, tp, last, mode) {
                    buffer.add(idx, tp);
                    joined += 1;
                    still_open.push(buffer);
                } else if self.keeps_open(tp, last) {
                    still_open.push(buffer);
                } else {
                    close_buffer(buffer, tps, self.config.min_tps, &mut clusters, &mut state.statistics);
                }
            }

            if joined == 0 {
                still_open.push(Buffer::seed(idx, tp));
            } else if joined > 1 {
                state.statistics.shared_tps += 1;
            }
            std::mem::swap(&mut state.open, &mut still_open);
        }

        for buffer in state.open.drain(..) {
            close_buffer(buffer, tps, self.config.min_tps, &mut clusters, &mut state.statistics);
        }

        state.statistics.tps_processed += tps.len();
        debug!(
            "{}: {} trigger primitives -> {} clusters",
            self.name(),
            tps.len(),
            clusters.len()
        );
        Ok(clusters)
    }

    fn accepts<P: Primitive>(&self, buffer: &Buffer, tp: &P, last: &P, mode: ClusteringMode) -> bool {
        let adjacent = match mode {
            ClusteringMode::TimeOnly => time_compatible(tp, last, self.config.tick_limit),
            ClusteringMode::TimeAndChannel => {
                compatible(tp, last, self.config.tick_limit, self.config.channel_limit)
            }
        };
        if !adjacent {
            return false;
        }
        match self.config.policy {
            ProximityPolicy::Chained => true,
            ProximityPolicy::BoundingBox {
                max_ticks,
                max_channels,
            } => {
                let channels = match mode {
                    ClusteringMode::TimeOnly => None,
                    ClusteringMode::TimeAndChannel => Some(max_channels),
                };
                buffer.fits_box(tp, max_ticks, channels)
            }
        }
    }

    /// Whether a buffer `tp` did not extend survives this step.
    fn keeps_open<P: Primitive>(&self, tp: &P, last: &P) -> bool {
        match self.config.closing {
            ClosingPolicy::Unextended => false,
            ClosingPolicy::TimeWindow => time_compatible(tp, last, self.config.tick_limit),
        }
    }
}

fn check_sorted<P: Primitive>(tps: &[P]) -> Result<(), ClusteringError> {
    for (i, pair) in tps.windows(2).enumerate() {
        let (previous, current) = (pair[0].time_start(), pair[1].time_start());
        if previous > current {
            return Err(ClusteringError::UnsortedInput {
                index: i + 1,
                previous,
                current,
            });
        }
    }
    Ok(())
}

fn close_buffer<P: Clone>(
    buffer: Buffer,
    tps: &[P],
    min_tps: usize,
    clusters: &mut Vec<Cluster<P>>,
    statistics: &mut ClusteringStatistics,
) {
    if buffer.indices.len() >= min_tps {
        clusters.push(buffer.indices.iter().map(|&i| tps[i].clone()).collect());
        statistics.clusters_found += 1;
    } else {
        statistics.buffers_dropped += 1;
    }
}

/// Clusters `tps` with a fresh state.
///
/// # Errors
/// See [`ProximityClustering::cluster`].
pub fn cluster_tps<P: Primitive + Clone>(
    tps: &[P],
    config: &ClusteringConfig,
    channel_map: &ChannelMap,
) -> Result<Vec<Cluster<P>>, ClusteringError> {
    let algo = ProximityClustering::new(config.clone());
    let mut state = ClusterState::default();
    algo.cluster(tps, channel_map, &mut state)
}
