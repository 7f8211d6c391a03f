//! Pipeline configuration file.
//!
//! ```json
//! {
//!   "detector":   { "geometry": "APA", "thresholds": { "u": 70, "v": 70, "x": 60 } },
//!   "clustering": { "tick_limit": 3, "channel_limit": 1, "min_tps": 1,
//!                   "policy": "chained", "closing": "unextended" },
//!   "image":      { "width": 32, "height": 32, "time_margin": 1, "oversize": "clip" },
//!   "waveform":   "area_optimized",
//!   "dataset":    { "min_tps": 2, "plane": "X", "normalize": false, "parallel": true }
//! }
//! ```
//!
//! Every section and field is optional.

use crate::Result;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tpraster_algorithms::{ClusteringConfig, DatasetBuilder, DatasetConfig, WaveformModel};
use tpraster_core::image::ImageConfig;
use tpraster_detector::DetectorConfig;

/// Everything needed to turn TP tables into a dataset.
#[derive(Clone, Debug, Default)]
pub struct PipelineConfig {
    pub detector: DetectorConfig,
    pub clustering: ClusteringConfig,
    pub image: ImageConfig,
    pub waveform: WaveformModel,
    pub dataset: DatasetConfig,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct JsonPipeline {
    detector: Option<serde_json::Value>,
    clustering: ClusteringConfig,
    image: ImageConfig,
    waveform: WaveformModel,
    dataset: DatasetConfig,
}

impl PipelineConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is invalid.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let json: JsonPipeline = serde_json::from_reader(BufReader::new(file))?;
        Self::from_json_pipeline(json)
    }

    /// Load configuration from a JSON string.
    ///
    /// # Errors
    /// Returns an error on malformed JSON or invalid values.
    pub fn from_json(json: &str) -> Result<Self> {
        let json: JsonPipeline = serde_json::from_str(json)?;
        Self::from_json_pipeline(json)
    }

    fn from_json_pipeline(json: JsonPipeline) -> Result<Self> {
        let detector = match json.detector {
            Some(value) => DetectorConfig::from_json_value(value)?,
            None => DetectorConfig::default(),
        };
        let config = Self {
            detector,
            clustering: json.clustering,
            image: json.image,
            waveform: json.waveform,
            dataset: json.dataset,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks numeric knobs for values the pipeline cannot honour.
    ///
    /// # Errors
    /// Returns a configuration error naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| -> Result<()> {
            Err(tpraster_core::Error::ConfigError(msg).into())
        };
        if self.image.width == 0 || self.image.height == 0 {
            return fail(format!(
                "image must be at least 1x1, got {}x{}",
                self.image.width, self.image.height
            ));
        }
        if self.image.time_margin < 0 {
            return fail(format!("time_margin must be >= 0, got {}", self.image.time_margin));
        }
        self.clustering
            .validate()
            .map_err(tpraster_core::Error::from)?;
        Ok(())
    }

    /// Dataset builder wired to this configuration.
    #[must_use]
    pub fn builder(&self) -> DatasetBuilder<'_> {
        DatasetBuilder::new(
            &self.detector,
            self.clustering.clone(),
            self.image.clone(),
            self.waveform,
        )
        .with_dataset_config(self.dataset.clone())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::Error;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tpraster_algorithms::{ClosingPolicy, ProximityPolicy};
    use tpraster_core::image::OversizePolicy;
    use tpraster_detector::{Geometry, Plane};

    #[test]
    fn test_defaults_from_empty_document() {
        let config = PipelineConfig::from_json("{}").unwrap();
        assert_eq!(config.detector.geometry, Geometry::Apa);
        assert_eq!(config.clustering, ClusteringConfig::default());
        assert_eq!(config.image, ImageConfig::default());
        assert_eq!(config.waveform, WaveformModel::AreaOptimized);
        assert_eq!(config.dataset, DatasetConfig::default());
    }

    #[test]
    fn test_full_document() {
        let json = r#"{
            "detector": {"geometry": "CRP", "thresholds": {"x": 55}},
            "clustering": {"tick_limit": 5, "channel_limit": 3, "policy": {"bounding_box": {"max_ticks": 50, "max_channels": 10}}, "closing": "time_window"},
            "image": {"width": 16, "height": 64, "oversize": "reject"},
            "waveform": "fixed_fraction",
            "dataset": {"min_tps": 2, "plane": "X", "normalize": true}
        }"#;
        let config = PipelineConfig::from_json(json).unwrap();
        assert_eq!(config.detector.geometry, Geometry::Crp);
        assert_eq!(config.detector.thresholds.x, 55.0);
        assert_eq!(config.detector.thresholds.u, 70.0);
        assert_eq!(config.clustering.tick_limit, 5);
        assert_eq!(config.clustering.min_tps, 1);
        assert_eq!(
            config.clustering.policy,
            ProximityPolicy::BoundingBox {
                max_ticks: 50,
                max_channels: 10
            }
        );
        assert_eq!(config.clustering.closing, ClosingPolicy::TimeWindow);
        assert_eq!(config.image.width, 16);
        assert_eq!(config.image.time_margin, 1);
        assert_eq!(config.image.oversize, OversizePolicy::Reject);
        assert_eq!(config.waveform, WaveformModel::FixedFraction);
        assert_eq!(config.dataset.plane, Some(Plane::X));
        assert!(config.dataset.normalize);
        assert!(config.dataset.parallel);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            PipelineConfig::from_json(r#"{"image": {"width": 0}}"#),
            Err(Error::CoreError(_))
        ));
        assert!(matches!(
            PipelineConfig::from_json(r#"{"clustering": {"tick_limit": -1}}"#),
            Err(Error::CoreError(_))
        ));
        assert!(matches!(
            PipelineConfig::from_json(r#"{"detector": {"geometry": "XYZ"}}"#),
            Err(Error::DetectorError(_))
        ));
        assert!(matches!(
            PipelineConfig::from_json("not json"),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"image": {{"width": 8, "height": 8}}}}"#).unwrap();
        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.image.len(), 64);
        assert_eq!(config.builder().image_config().width, 8);
    }
}
