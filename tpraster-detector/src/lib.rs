//! tpraster-detector: detector geometry, channel maps and plane thresholds.
//!
//! Everything the pipeline needs to know about the detector lives in a
//! [`DetectorConfig`] value built once and passed by reference: which
//! geometry is in use, which plane each channel belongs to, and the ADC
//! threshold that caused hits on each plane to be recorded.
//!
//! # Key Components
//!
//! - [`Plane`] / [`ChannelMap`] - channel to wire-plane lookup
//! - [`Geometry`] - built-in layouts for APA, CRP and 50L detectors
//! - [`PlaneThresholds`] - per-plane baseline used by waveform reconstruction

mod channel_map;
mod error;

pub use channel_map::{ChannelMap, Plane};
pub use error::{Error, Result};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

/// Built-in detector geometries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Geometry {
    /// Horizontal-drift Anode Plane Assembly (2560 channels).
    #[serde(rename = "APA")]
    Apa,
    /// Vertical-drift Charge Readout Plane (3072 channels).
    #[serde(rename = "CRP")]
    Crp,
    /// 50-litre prototype (128 channels).
    #[serde(rename = "50L")]
    FiftyLitre,
}

impl Geometry {
    /// Consecutive `(plane, n_channels)` blocks of one readout unit.
    #[must_use]
    pub fn plane_layout(self) -> Vec<(Plane, usize)> {
        match self {
            Geometry::Apa => vec![(Plane::U, 800), (Plane::V, 800), (Plane::X, 960)],
            Geometry::Crp => vec![(Plane::U, 952), (Plane::V, 952), (Plane::X, 1168)],
            Geometry::FiftyLitre => vec![(Plane::U, 32), (Plane::V, 32), (Plane::X, 64)],
        }
    }

    /// Channel map of the built-in layout.
    ///
    /// # Errors
    /// Never fails for built-in layouts; the `Result` mirrors
    /// [`ChannelMap::from_layout`].
    pub fn channel_map(self) -> Result<ChannelMap> {
        ChannelMap::from_layout(&self.plane_layout())
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Geometry::Apa => "APA",
            Geometry::Crp => "CRP",
            Geometry::FiftyLitre => "50L",
        };
        f.write_str(name)
    }
}

impl FromStr for Geometry {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "APA" => Ok(Geometry::Apa),
            "CRP" => Ok(Geometry::Crp),
            "50L" => Ok(Geometry::FiftyLitre),
            _ => Err(Error::UnknownGeometry(s.to_string())),
        }
    }
}

/// ADC threshold per plane: the minimum amplitude that produced a TP.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaneThresholds {
    pub u: f64,
    pub v: f64,
    pub x: f64,
}

impl Default for PlaneThresholds {
    fn default() -> Self {
        Self {
            u: 70.0,
            v: 70.0,
            x: 60.0,
        }
    }
}

impl PlaneThresholds {
    /// Threshold of a plane.
    #[inline]
    #[must_use]
    pub fn for_plane(&self, plane: Plane) -> f64 {
        match plane {
            Plane::U => self.u,
            Plane::V => self.v,
            Plane::X => self.x,
        }
    }

    /// Checks every threshold is positive and finite.
    ///
    /// # Errors
    /// Returns [`Error::InvalidThreshold`] naming the first bad plane.
    pub fn validate(&self) -> Result<()> {
        for plane in Plane::ALL {
            let value = self.for_plane(plane);
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::InvalidThreshold {
                    plane: plane.letter(),
                    value,
                });
            }
        }
        Ok(())
    }
}

/// Detector description shared by every pipeline stage.
#[derive(Clone, Debug)]
pub struct DetectorConfig {
    /// Geometry the channel map was built from.
    pub geometry: Geometry,
    /// Channel to plane lookup.
    pub channel_map: ChannelMap,
    /// Per-plane ADC thresholds.
    pub thresholds: PlaneThresholds,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::apa_defaults()
    }
}

// Intermediate structs for the JSON schema
#[derive(Deserialize)]
struct JsonConfig {
    detector: JsonDetector,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct JsonDetector {
    geometry: Option<String>,
    plane_layout: Option<Vec<JsonPlaneBlock>>,
    thresholds: PlaneThresholds,
}

#[derive(Deserialize)]
struct JsonPlaneBlock {
    plane: String,
    channels: usize,
}

impl DetectorConfig {
    /// Horizontal-drift APA with the standard thresholds.
    #[must_use]
    pub fn apa_defaults() -> Self {
        Self {
            geometry: Geometry::Apa,
            channel_map: ChannelMap::from_layout(&Geometry::Apa.plane_layout())
                .unwrap_or_else(|_| unreachable!("built-in APA layout is non-empty")),
            thresholds: PlaneThresholds::default(),
        }
    }

    /// Builds the configuration of a built-in geometry.
    ///
    /// # Errors
    /// Propagates channel-map construction errors.
    pub fn for_geometry(geometry: Geometry, thresholds: PlaneThresholds) -> Result<Self> {
        thresholds.validate()?;
        Ok(Self {
            geometry,
            channel_map: geometry.channel_map()?,
            thresholds,
        })
    }

    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or does not describe a
    /// valid detector.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let json_config: JsonConfig = serde_json::from_reader(reader)?;
        Self::from_json_detector(json_config.detector)
    }

    /// Load configuration from a JSON string.
    ///
    /// Missing fields fall back to the APA defaults. An explicit
    /// `plane_layout` overrides the geometry's built-in layout.
    ///
    /// # Errors
    /// Returns an error on malformed JSON, unknown names or bad thresholds.
    pub fn from_json(json: &str) -> Result<Self> {
        let json_config: JsonConfig = serde_json::from_str(json)?;
        Self::from_json_detector(json_config.detector)
    }

    /// Builds the configuration from the `detector` section of a JSON document.
    ///
    /// # Errors
    /// Same as [`Self::from_json`].
    pub fn from_json_value(value: serde_json::Value) -> Result<Self> {
        let detector: JsonDetector = serde_json::from_value(value)?;
        Self::from_json_detector(detector)
    }

    fn from_json_detector(detector: JsonDetector) -> Result<Self> {
        let geometry = match detector.geometry {
            Some(name) => name.parse()?,
            None => Geometry::Apa,
        };

        let channel_map = match detector.plane_layout {
            Some(blocks) if !blocks.is_empty() => {
                let layout = blocks
                    .into_iter()
                    .map(|b| Ok((b.plane.parse::<Plane>()?, b.channels)))
                    .collect::<Result<Vec<_>>>()?;
                ChannelMap::from_layout(&layout)?
            }
            _ => geometry.channel_map()?,
        };

        detector.thresholds.validate()?;

        Ok(Self {
            geometry,
            channel_map,
            thresholds: detector.thresholds,
        })
    }

    /// Plane of a raw channel.
    #[inline]
    #[must_use]
    pub fn plane_of(&self, channel: u32) -> Plane {
        self.channel_map.plane_of(channel)
    }

    /// Threshold for the plane a channel belongs to.
    #[inline]
    #[must_use]
    pub fn threshold_for_channel(&self, channel: u32) -> f64 {
        self.thresholds.for_plane(self.plane_of(channel))
    }
}
