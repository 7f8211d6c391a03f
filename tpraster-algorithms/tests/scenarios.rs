#![allow(clippy::float_cmp)]
use approx::assert_relative_eq;
use tpraster_algorithms::{
    cluster_tps, ClusterState, ClusteringConfig, ClusteringMode, DatasetBuilder, ImageRasterizer,
    PentagonWaveform, ProximityClustering, WaveformModel,
};
use tpraster_core::{Cluster, ImageConfig, TriggerPrimitive, METADATA_WIDTH};
use tpraster_detector::{DetectorConfig, Geometry, PlaneThresholds};

fn tp(time: i64, tot: u32, peak_offset: u32, channel: u32, peak: f64) -> TriggerPrimitive {
    TriggerPrimitive::new(time, tot, peak_offset, channel, 10.0 * peak, peak, 0).unwrap()
}

#[test]
fn scenario_track_plus_dropped_singleton() {
    let tps: Vec<_> = [(100, 10), (102, 11), (104, 12), (200, 10)]
        .into_iter()
        .map(|(t, ch)| tp(t, 4, 2, ch, 150.0))
        .collect();
    let config = ClusteringConfig::default()
        .with_tick_limit(5)
        .with_channel_limit(3)
        .with_min_tps(2);
    let map = Geometry::Apa.channel_map().unwrap();
    let clusters = cluster_tps(&tps, &config, &map).unwrap();
    assert_eq!(clusters.len(), 1);
    let times: Vec<i64> = clusters[0].iter().map(|t| t.time_start).collect();
    assert_eq!(times, vec![100, 102, 104]);
}

#[test]
fn scenario_pentagon_endpoints() {
    for model in [WaveformModel::FixedFraction, WaveformModel::AreaOptimized] {
        let w = PentagonWaveform::from_summary(0.0, 5.0, 10.0, 200.0, 1500.0, 60.0, model)
            .unwrap();
        assert_eq!(w.amplitude_at(0.0), 60.0, "{model:?}");
        assert_eq!(w.amplitude_at(10.0), 60.0, "{model:?}");
        assert_eq!(w.amplitude_at(5.0), 200.0, "{model:?}");
    }
}

#[test]
fn scenario_degenerate_pentagon_contributes_zero() {
    let weak = tp(100, 10, 5, 1700, 50.0);
    assert!(PentagonWaveform::reconstruct(&weak, 60.0, WaveformModel::AreaOptimized).is_err());

    let map = Geometry::Apa.channel_map().unwrap();
    let out = ImageRasterizer::new(ImageConfig::new(4, 16), WaveformModel::AreaOptimized)
        .rasterize(&[weak], &map, &PlaneThresholds::default())
        .unwrap();
    assert_eq!(out.degenerate_tps, 1);
    assert!(out.image.iter().all(|&v| v == 0.0));
}

#[test]
fn scenario_overlap_is_max_not_sum() {
    let map = Geometry::Apa.channel_map().unwrap();
    let tps = [tp(100, 10, 5, 1700, 100.0), tp(100, 10, 5, 1700, 150.0)];
    let out = ImageRasterizer::new(ImageConfig::new(4, 16), WaveformModel::FixedFraction)
        .rasterize(&tps, &map, &PlaneThresholds::default())
        .unwrap();
    let max = out.image.iter().copied().fold(0.0f32, f32::max);
    assert_relative_eq!(max, 150.0);
}

#[test]
fn scenario_empty_cluster_list() {
    let detector = DetectorConfig::apa_defaults();
    let builder = DatasetBuilder::new(
        &detector,
        ClusteringConfig::default(),
        ImageConfig::new(24, 40),
        WaveformModel::AreaOptimized,
    );
    let mut acc = builder.accumulator();
    let mut report = Default::default();
    let clusters: Vec<Cluster> = Vec::new();
    builder
        .build_from_clusters(&clusters, &mut acc, &mut report)
        .unwrap();
    let dataset = acc.finish();
    assert_eq!(dataset.images.shape(), &[0, 40, 24]);
    assert_eq!(dataset.metadata.shape(), &[0, METADATA_WIDTH]);

    let (dataset, _) = builder.build(Vec::<Vec<TriggerPrimitive>>::new()).unwrap();
    assert!(dataset.is_empty());
}

#[test]
fn scenario_multi_plane_falls_back_to_time_only() {
    let map = Geometry::Apa.channel_map().unwrap();
    // U channel 10 and collection channel 1700 are far apart in channel
    // number but coincident in time.
    let tps = [tp(100, 4, 2, 10, 150.0), tp(101, 4, 2, 1700, 150.0)];
    let algo = ProximityClustering::new(ClusteringConfig::default());
    let mut state = ClusterState::default();
    let clusters = algo.cluster(&tps, &map, &mut state).unwrap();
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].len(), 2);
    assert_eq!(algo.statistics(&state).mode, ClusteringMode::TimeOnly);
}
