//! Trigger-primitive traits and types.

use crate::error::{Error, Result};
use crate::truth::TpTruth;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single trigger primitive: the summary record emitted when a detector
/// channel's signal crosses its ADC threshold.
///
/// Times are in detector ticks. `samples_to_peak` and
/// `samples_over_threshold` are offsets/durations relative to `time_start`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TriggerPrimitive {
    /// Tick of the threshold crossing.
    pub time_start: i64,
    /// Duration above threshold (ticks).
    pub samples_over_threshold: u32,
    /// Offset from `time_start` to the amplitude peak (ticks).
    pub samples_to_peak: u32,
    /// Detector channel.
    pub channel: u32,
    /// Total area under the waveform (charge proxy).
    pub adc_integral: f64,
    /// Peak amplitude.
    pub adc_peak: f64,
    /// TPC/APA segment identifier.
    pub detid: u32,
}

impl TriggerPrimitive {
    /// Creates a validated trigger primitive.
    ///
    /// # Errors
    /// Returns [`Error::InvalidPrimitive`] if an ADC value is not finite or
    /// negative. A peak offset beyond the window is accepted here and clamped
    /// at reconstruction time.
    pub fn new(
        time_start: i64,
        samples_over_threshold: u32,
        samples_to_peak: u32,
        channel: u32,
        adc_integral: f64,
        adc_peak: f64,
        detid: u32,
    ) -> Result<Self> {
        for (name, value) in [("adc_integral", adc_integral), ("adc_peak", adc_peak)] {
            if !value.is_finite() {
                return Err(Error::InvalidPrimitive(format!("{name} is not finite")));
            }
            if value < 0.0 {
                return Err(Error::InvalidPrimitive(format!("{name} is negative: {value}")));
            }
        }
        Ok(Self {
            time_start,
            samples_over_threshold,
            samples_to_peak,
            channel,
            adc_integral,
            adc_peak,
            detid,
        })
    }

    /// Absolute tick of the peak, clamped into the active window.
    #[inline]
    #[must_use]
    pub fn time_peak(&self) -> i64 {
        self.time_start + i64::from(self.samples_to_peak.min(self.samples_over_threshold))
    }

    /// Absolute tick at which the signal falls back below threshold.
    #[inline]
    #[must_use]
    pub fn time_end(&self) -> i64 {
        self.time_start + i64::from(self.samples_over_threshold)
    }
}

/// Trait for anything the clusterer and rasterizer can consume.
///
/// Algorithms are written against these accessors so plain and
/// truth-tagged records share code.
pub trait Primitive: Send + Sync {
    /// Returns the underlying trigger primitive.
    fn tp(&self) -> &TriggerPrimitive;

    /// Returns simulation truth, if the source carries any.
    #[inline]
    fn truth(&self) -> Option<&TpTruth> {
        None
    }

    /// Returns the start tick.
    #[inline]
    fn time_start(&self) -> i64 {
        self.tp().time_start
    }

    /// Returns the detector channel.
    #[inline]
    fn channel(&self) -> u32 {
        self.tp().channel
    }
}

impl Primitive for TriggerPrimitive {
    #[inline]
    fn tp(&self) -> &TriggerPrimitive {
        self
    }
}

/// A trigger primitive paired with its simulation truth.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TaggedPrimitive {
    /// The hit itself.
    pub tp: TriggerPrimitive,
    /// Truth carried by the data source.
    pub truth: Option<TpTruth>,
}

impl TaggedPrimitive {
    /// Creates a tagged primitive.
    #[must_use]
    pub fn new(tp: TriggerPrimitive, truth: Option<TpTruth>) -> Self {
        Self { tp, truth }
    }
}

impl Primitive for TaggedPrimitive {
    #[inline]
    fn tp(&self) -> &TriggerPrimitive {
        &self.tp
    }

    #[inline]
    fn truth(&self) -> Option<&TpTruth> {
        self.truth.as_ref()
    }
}

/// Pairwise adjacency predicate.
///
/// Both comparisons are strict: a TP exactly `tick_limit` ticks away is not
/// adjacent.
#[inline]
#[must_use]
pub fn compatible<A, B>(a: &A, b: &B, tick_limit: i64, channel_limit: i64) -> bool
where
    A: Primitive + ?Sized,
    B: Primitive + ?Sized,
{
    time_compatible(a, b, tick_limit)
        && (i64::from(a.channel()) - i64::from(b.channel())).abs() < channel_limit
}

/// Time half of [`compatible`], used by the time-only fallback.
#[inline]
#[must_use]
pub fn time_compatible<A, B>(a: &A, b: &B, tick_limit: i64) -> bool
where
    A: Primitive + ?Sized,
    B: Primitive + ?Sized,
{
    (a.time_start() - b.time_start()).abs() < tick_limit
}
