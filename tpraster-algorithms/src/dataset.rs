//! Cluster-to-dataset orchestration.
//!
//! Clusters are rasterized independently, optionally in parallel, and then
//! appended in input order. An image and its metadata row are always
//! appended together, so the two containers stay index-aligned.

use crate::clusterer::{ClusterState, ProximityClustering};
use crate::raster::{normalize_by_max, ImageRasterizer};
use crate::waveform::WaveformModel;
use log::{debug, warn};
use ndarray::{Array2, Array3, Axis};
use rayon::prelude::*;
use tpraster_core::clustering::{Cluster, ClusteringConfig, ClusteringMode, ClusteringStatistics};
use tpraster_core::error::{ClusterError, ClusteringError, Error, Result};
use tpraster_core::image::{ImageConfig, MetadataRow, METADATA_WIDTH};
use tpraster_core::primitive::Primitive;
use tpraster_detector::{DetectorConfig, Plane};

/// Dataset-level filtering and post-processing.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DatasetConfig {
    /// Clusters with fewer TPs are excluded. Values below 1 act as 1.
    pub min_tps: usize,
    /// Keep only clusters whose majority plane is this one.
    pub plane: Option<Plane>,
    /// Divide each image by its own maximum.
    pub normalize: bool,
    /// Rasterize clusters on the rayon pool.
    pub parallel: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            min_tps: 1,
            plane: None,
            normalize: false,
            parallel: true,
        }
    }
}

/// One rendered cluster, ready to be appended.
#[derive(Clone, Debug)]
pub struct ClusterImage {
    /// `(height, width)` image.
    pub image: Array2<f32>,
    /// Metadata row for the image.
    pub metadata: MetadataRow,
    /// Majority plane of the cluster.
    pub plane: Plane,
    /// Members that contributed nothing.
    pub degenerate_tps: usize,
}

/// Counters collected while building a dataset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Event streams clustered.
    pub events: usize,
    /// Events that fell back to time-only clustering.
    pub time_only_events: usize,
    /// Clusters offered to the builder.
    pub clusters_seen: usize,
    /// Images appended.
    pub images: usize,
    /// Clusters below the dataset minimum size.
    pub skipped_too_small: usize,
    /// Clusters on an excluded plane.
    pub skipped_plane: usize,
    /// Clusters rejected by the rasterizer.
    pub skipped_raster: usize,
    /// TPs whose waveform was degenerate.
    pub degenerate_tps: usize,
    /// Clusterer counters summed over events.
    pub clustering: ClusteringStatistics,
}

impl BuildReport {
    /// Adds another report's counters to this one.
    pub fn merge(&mut self, other: &BuildReport) {
        self.events += other.events;
        self.time_only_events += other.time_only_events;
        self.clusters_seen += other.clusters_seen;
        self.images += other.images;
        self.skipped_too_small += other.skipped_too_small;
        self.skipped_plane += other.skipped_plane;
        self.skipped_raster += other.skipped_raster;
        self.degenerate_tps += other.degenerate_tps;
        self.add_clustering(&other.clustering);
    }

    fn add_clustering(&mut self, stats: &ClusteringStatistics) {
        self.clustering.tps_processed += stats.tps_processed;
        self.clustering.clusters_found += stats.clusters_found;
        self.clustering.buffers_dropped += stats.buffers_dropped;
        self.clustering.shared_tps += stats.shared_tps;
        if self.time_only_events > 0 || stats.mode == ClusteringMode::TimeOnly {
            self.clustering.mode = ClusteringMode::TimeOnly;
        }
    }

    fn record_skip(&mut self, index: usize, err: &ClusterError) {
        match err {
            ClusterError::TooSmall { .. } => self.skipped_too_small += 1,
            ClusterError::PlaneExcluded { .. } => self.skipped_plane += 1,
            ClusterError::Raster(_) => self.skipped_raster += 1,
        }
        if err.is_filter() {
            debug!("cluster {index} skipped: {err}");
        } else {
            warn!("cluster {index} skipped: {err}");
        }
    }
}

/// Final dense containers.
///
/// `images` has shape `(N, height, width)`, `metadata` has shape
/// `(N, METADATA_WIDTH)`. Row `i` of `metadata` describes `images[i]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    /// Stacked images.
    pub images: Array3<f32>,
    /// Stacked metadata rows.
    pub metadata: Array2<f32>,
}

impl Dataset {
    /// A dataset with no images.
    #[must_use]
    pub fn empty(height: usize, width: usize) -> Self {
        Self {
            images: Array3::zeros((0, height, width)),
            metadata: Array2::zeros((0, METADATA_WIDTH)),
        }
    }

    /// Number of images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.images.len_of(Axis(0))
    }

    /// Returns true if there are no images.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Append-only image/metadata store.
#[derive(Clone, Debug)]
pub struct DatasetAccumulator {
    height: usize,
    width: usize,
    images: Vec<Array2<f32>>,
    metadata: Vec<MetadataRow>,
}

impl DatasetAccumulator {
    /// Creates an empty accumulator for images of the given shape.
    #[must_use]
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            images: Vec::new(),
            metadata: Vec::new(),
        }
    }

    /// Creates an empty accumulator matching an image configuration.
    #[must_use]
    pub fn for_image(config: &ImageConfig) -> Self {
        Self::new(config.height, config.width)
    }

    /// Appends one image together with its metadata row.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if the image has the wrong shape;
    /// nothing is appended in that case.
    pub fn push(&mut self, image: Array2<f32>, metadata: MetadataRow) -> Result<()> {
        if image.dim() != (self.height, self.width) {
            return Err(Error::ShapeMismatch {
                expected: (self.height, self.width),
                found: image.dim(),
            });
        }
        self.images.push(image);
        self.metadata.push(metadata);
        Ok(())
    }

    /// Moves all entries of `other` to the end of `self`.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if the image shapes differ.
    pub fn append(&mut self, other: DatasetAccumulator) -> Result<()> {
        if (other.height, other.width) != (self.height, self.width) {
            return Err(Error::ShapeMismatch {
                expected: (self.height, self.width),
                found: (other.height, other.width),
            });
        }
        self.images.extend(other.images);
        self.metadata.extend(other.metadata);
        Ok(())
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Returns true if nothing was appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Metadata rows appended so far.
    #[must_use]
    pub fn metadata(&self) -> &[MetadataRow] {
        &self.metadata
    }

    /// Stacks the entries into dense arrays.
    #[must_use]
    pub fn finish(self) -> Dataset {
        let n = self.images.len();
        let mut images = Array3::zeros((n, self.height, self.width));
        for (mut dst, src) in images.outer_iter_mut().zip(&self.images) {
            dst.assign(src);
        }
        let rows = &self.metadata;
        let metadata = Array2::from_shape_fn((n, METADATA_WIDTH), |(i, j)| rows[i].0[j]);
        Dataset { images, metadata }
    }
}

/// Runs clustering, rasterization and metadata extraction for one detector.
#[derive(Clone, Debug)]
pub struct DatasetBuilder<'a> {
    detector: &'a DetectorConfig,
    clusterer: ProximityClustering,
    rasterizer: ImageRasterizer,
    config: DatasetConfig,
}

impl<'a> DatasetBuilder<'a> {
    /// Creates a builder with the default dataset configuration.
    #[must_use]
    pub fn new(
        detector: &'a DetectorConfig,
        clustering: ClusteringConfig,
        image: ImageConfig,
        model: WaveformModel,
    ) -> Self {
        Self {
            detector,
            clusterer: ProximityClustering::new(clustering),
            rasterizer: ImageRasterizer::new(image, model),
            config: DatasetConfig::default(),
        }
    }

    /// Replaces the dataset configuration.
    #[must_use]
    pub fn with_dataset_config(mut self, config: DatasetConfig) -> Self {
        self.config = config;
        self
    }

    /// Dataset configuration.
    #[must_use]
    pub fn dataset_config(&self) -> &DatasetConfig {
        &self.config
    }

    /// Image configuration.
    #[must_use]
    pub fn image_config(&self) -> &ImageConfig {
        self.rasterizer.config()
    }

    /// A fresh accumulator for this builder's image shape.
    #[must_use]
    pub fn accumulator(&self) -> DatasetAccumulator {
        DatasetAccumulator::for_image(self.rasterizer.config())
    }

    /// Renders one cluster and its metadata row.
    ///
    /// # Errors
    /// Returns [`ClusterError::TooSmall`] or [`ClusterError::PlaneExcluded`]
    /// for filtered clusters, and [`ClusterError::Raster`] when the
    /// rasterizer rejects the cluster.
    pub fn process_cluster<P: Primitive>(
        &self,
        cluster: &Cluster<P>,
    ) -> std::result::Result<ClusterImage, ClusterError> {
        let min = self.config.min_tps.max(1);
        if cluster.len() < min {
            return Err(ClusterError::TooSmall {
                len: cluster.len(),
                min,
            });
        }

        let channel_map = &self.detector.channel_map;
        let plane = channel_map
            .majority_plane(cluster.iter().map(Primitive::channel))
            .ok_or(ClusterError::TooSmall { len: 0, min })?;
        if let Some(wanted) = self.config.plane {
            if plane != wanted {
                return Err(ClusterError::PlaneExcluded { plane: plane.id() });
            }
        }

        let output =
            self.rasterizer
                .rasterize(&cluster.tps, channel_map, &self.detector.thresholds)?;
        let mut image = output.image;
        if self.config.normalize {
            normalize_by_max(&mut image);
        }

        let truth = cluster.truth();
        Ok(ClusterImage {
            image,
            metadata: MetadataRow::new(truth.as_ref(), plane.id()),
            plane,
            degenerate_tps: output.degenerate_tps,
        })
    }

    /// Renders `clusters` and appends the survivors to `acc` in input order.
    ///
    /// Per-cluster failures are logged and counted, never fatal.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if `acc` was created for a different
    /// image shape.
    pub fn build_from_clusters<P: Primitive>(
        &self,
        clusters: &[Cluster<P>],
        acc: &mut DatasetAccumulator,
        report: &mut BuildReport,
    ) -> Result<()> {
        report.clusters_seen += clusters.len();
        let results: Vec<_> = if self.config.parallel {
            clusters
                .par_iter()
                .map(|cluster| self.process_cluster(cluster))
                .collect()
        } else {
            clusters
                .iter()
                .map(|cluster| self.process_cluster(cluster))
                .collect()
        };

        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(rendered) => {
                    report.degenerate_tps += rendered.degenerate_tps;
                    acc.push(rendered.image, rendered.metadata)?;
                    report.images += 1;
                }
                Err(err) => report.record_skip(index, &err),
            }
        }
        Ok(())
    }

    /// Clusters each event stream independently and appends its images.
    ///
    /// Each stream is stably sorted by `time_start` first, so TPs sharing a
    /// start time keep their input order.
    ///
    /// # Errors
    /// Propagates clustering errors and accumulator shape errors.
    pub fn build_from_events<P, I>(
        &self,
        events: I,
        acc: &mut DatasetAccumulator,
        report: &mut BuildReport,
    ) -> Result<()>
    where
        P: Primitive + Clone,
        I: IntoIterator<Item = Vec<P>>,
    {
        let mut state = ClusterState::default();
        for mut tps in events {
            tps.sort_by_key(Primitive::time_start);
            let clusters = self.cluster_event(&tps, &mut state, report)?;
            self.build_from_clusters(&clusters, acc, report)?;
        }
        report.add_clustering(&self.clusterer.statistics(&state));
        Ok(())
    }

    /// Convenience wrapper returning the finished dataset.
    ///
    /// # Errors
    /// See [`Self::build_from_events`].
    pub fn build<P, I>(&self, events: I) -> Result<(Dataset, BuildReport)>
    where
        P: Primitive + Clone,
        I: IntoIterator<Item = Vec<P>>,
    {
        let mut acc = self.accumulator();
        let mut report = BuildReport::default();
        self.build_from_events(events, &mut acc, &mut report)?;
        Ok((acc.finish(), report))
    }

    fn cluster_event<P: Primitive + Clone>(
        &self,
        tps: &[P],
        state: &mut ClusterState,
        report: &mut BuildReport,
    ) -> std::result::Result<Vec<Cluster<P>>, ClusteringError> {
        report.events += 1;
        let clusters = self
            .clusterer
            .cluster(tps, &self.detector.channel_map, state)?;
        if !tps.is_empty() && self.clusterer.statistics(state).mode == ClusteringMode::TimeOnly {
            report.time_only_events += 1;
        }
        Ok(clusters)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use tpraster_core::image::{OversizePolicy, MISSING};
    use tpraster_core::primitive::{TaggedPrimitive, TriggerPrimitive};
    use tpraster_core::truth::{GeneratorLabel, TpTruth};

    fn tp(time: i64, channel: u32) -> TriggerPrimitive {
        TriggerPrimitive::new(time, 6, 3, channel, 1500.0, 200.0, 0).unwrap()
    }

    fn builder(detector: &DetectorConfig) -> DatasetBuilder<'_> {
        DatasetBuilder::new(
            detector,
            ClusteringConfig::default()
                .with_tick_limit(5)
                .with_channel_limit(3),
            ImageConfig::new(8, 16),
            WaveformModel::AreaOptimized,
        )
    }

    #[test]
    fn test_empty_cluster_list() {
        let detector = DetectorConfig::apa_defaults();
        let b = builder(&detector);
        let mut acc = b.accumulator();
        let mut report = BuildReport::default();
        b.build_from_clusters::<TriggerPrimitive>(&[], &mut acc, &mut report)
            .unwrap();
        let dataset = acc.finish();
        assert_eq!(dataset.images.dim(), (0, 16, 8));
        assert_eq!(dataset.metadata.dim(), (0, METADATA_WIDTH));
        assert_eq!(dataset, Dataset::empty(16, 8));
    }

    #[test]
    fn test_filtering_keeps_correspondence() {
        let detector = DetectorConfig::apa_defaults();
        let b = builder(&detector).with_dataset_config(DatasetConfig {
            min_tps: 2,
            ..DatasetConfig::default()
        });
        let clusters: Vec<Cluster> = vec![
            [tp(100, 1700), tp(102, 1701)].into_iter().collect(),
            [tp(300, 1800)].into_iter().collect(),
            [tp(500, 10), tp(501, 11), tp(502, 12)].into_iter().collect(),
        ];
        let mut acc = b.accumulator();
        let mut report = BuildReport::default();
        b.build_from_clusters(&clusters, &mut acc, &mut report).unwrap();
        assert_eq!(report.clusters_seen, 3);
        assert_eq!(report.images, 2);
        assert_eq!(report.skipped_too_small, 1);

        let dataset = acc.finish();
        assert_eq!(dataset.images.len_of(Axis(0)), dataset.metadata.nrows());
        // Survivors keep input order: collection cluster, then induction.
        assert_eq!(dataset.metadata[[0, 10]], 2.0);
        assert_eq!(dataset.metadata[[1, 10]], 0.0);
    }

    #[test]
    fn test_plane_selection() {
        let detector = DetectorConfig::apa_defaults();
        let b = builder(&detector).with_dataset_config(DatasetConfig {
            plane: Some(Plane::X),
            ..DatasetConfig::default()
        });
        let induction: Cluster = [tp(100, 10)].into_iter().collect();
        assert_eq!(
            b.process_cluster(&induction).unwrap_err(),
            ClusterError::PlaneExcluded { plane: 0 }
        );
        let collection: Cluster = [tp(100, 1700)].into_iter().collect();
        assert_eq!(b.process_cluster(&collection).unwrap().plane, Plane::X);
    }

    #[test]
    fn test_oversize_reject_is_skipped_not_fatal() {
        let detector = DetectorConfig::apa_defaults();
        let b = DatasetBuilder::new(
            &detector,
            ClusteringConfig::default(),
            ImageConfig::new(2, 16).with_oversize(OversizePolicy::Reject),
            WaveformModel::FixedFraction,
        );
        let wide: Cluster = [tp(100, 1700), tp(100, 1701), tp(100, 1702)]
            .into_iter()
            .collect();
        let narrow: Cluster = [tp(100, 1700)].into_iter().collect();
        let mut acc = b.accumulator();
        let mut report = BuildReport::default();
        b.build_from_clusters(&[wide, narrow], &mut acc, &mut report)
            .unwrap();
        assert_eq!(report.skipped_raster, 1);
        assert_eq!(acc.len(), 1);
    }

    #[test]
    fn test_normalize_option() {
        let detector = DetectorConfig::apa_defaults();
        let b = builder(&detector).with_dataset_config(DatasetConfig {
            normalize: true,
            ..DatasetConfig::default()
        });
        let cluster: Cluster = [tp(100, 1700)].into_iter().collect();
        let rendered = b.process_cluster(&cluster).unwrap();
        let max = rendered.image.iter().copied().fold(0.0f32, f32::max);
        assert_eq!(max, 1.0);
    }

    #[test]
    fn test_metadata_from_truth() {
        let detector = DetectorConfig::apa_defaults();
        let b = builder(&detector);
        let truth = TpTruth {
            label: GeneratorLabel::Marley,
            is_main_track: true,
            position: Some([1.0, 2.0, 3.0]),
            neutrino_energy: Some(12.5),
            ..TpTruth::background()
        };
        let cluster: Cluster<TaggedPrimitive> = [
            TaggedPrimitive::new(tp(100, 1700), Some(truth)),
            TaggedPrimitive::new(tp(101, 1701), None),
        ]
        .into_iter()
        .collect();
        let row = b.process_cluster(&cluster).unwrap().metadata;
        assert_eq!(row.0[0], 1.0);
        assert_eq!(row.0[1], 1.0);
        assert_eq!(&row.0[2..5], &[1.0, 2.0, 3.0]);
        assert_eq!(row.0[5], MISSING);
        assert_eq!(row.0[8], 12.5);
        assert_eq!(row.0[10], 2.0);
    }

    #[test]
    fn test_events_are_sorted_and_clustered_independently() {
        let detector = DetectorConfig::apa_defaults();
        let b = builder(&detector);
        // Same times in two events must not merge across events.
        let events = vec![
            vec![tp(104, 1702), tp(100, 1700), tp(102, 1701)],
            vec![tp(100, 1700)],
        ];
        let (dataset, report) = b.build(events).unwrap();
        assert_eq!(report.events, 2);
        assert_eq!(report.clustering.clusters_found, 2);
        assert_eq!(report.clustering.tps_processed, 4);
        assert_eq!(dataset.len(), 2);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let detector = DetectorConfig::apa_defaults();
        let events: Vec<Vec<TriggerPrimitive>> = (0..20)
            .map(|e| {
                (0..15)
                    .map(|i| tp(i64::from(i) * 2, 1600 + (i * 7 + e) % 40))
                    .collect()
            })
            .collect();
        let parallel = builder(&detector);
        let sequential = builder(&detector).with_dataset_config(DatasetConfig {
            parallel: false,
            ..DatasetConfig::default()
        });
        let (a, ra) = parallel.build(events.clone()).unwrap();
        let (b, rb) = sequential.build(events).unwrap();
        assert_eq!(a, b);
        assert_eq!(ra, rb);
    }

    #[test]
    fn test_accumulator_rejects_wrong_shape() {
        let mut acc = DatasetAccumulator::new(4, 4);
        let err = acc
            .push(Array2::zeros((3, 4)), MetadataRow::new(None, 2))
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
        assert!(acc.is_empty());
        assert!(acc.metadata().is_empty());
    }
}
