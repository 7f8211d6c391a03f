//! Pentagon waveform reconstruction.
//!
//! A trigger primitive only keeps a handful of summary numbers. The waveform
//! is approximated by five vertices:
//!
//! ```text
//!              (t_peak, adc_peak)
//!                    /\
//!     (t1, h1)  ____/  \____  (t2, h2)
//!              /            \
//! (t_start, thr)            (t_end, thr)
//! ```
//!
//! The base vertices sit on the plane threshold: the signal was above
//! threshold for the whole active window, so the amplitude never drops to
//! zero inside it. The interior vertices are placed either at a fixed
//! fraction ([`WaveformModel::FixedFraction`]) or at the height that makes
//! the total area match `adc_integral` ([`WaveformModel::AreaOptimized`]).
#![allow(clippy::cast_precision_loss)]

use tpraster_core::error::{DegenerateReason, WaveformError};
use tpraster_core::primitive::TriggerPrimitive;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Fraction of the rise/fall span at which interior vertices are placed.
pub const VERTEX_FRACTION: f64 = 0.5;
/// Interior-vertex height for the fixed-fraction model, as a fraction of
/// `adc_peak - threshold`.
pub const FIXED_HEIGHT_FRACTION: f64 = 0.6;

const GOLDEN_RATIO_CONJUGATE: f64 = 0.618_033_988_749_894_9;
const MAX_ITERATIONS: usize = 200;

/// Interior-vertex placement strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum WaveformModel {
    /// Heuristic shape independent of `adc_integral`. Fast path kept for
    /// compatibility with older datasets.
    FixedFraction,
    /// Interior height solved by bounded 1D minimisation so the total area
    /// matches `adc_integral`.
    #[default]
    AreaOptimized,
}

/// Five-vertex piecewise-linear waveform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PentagonWaveform {
    vertices: [(f64, f64); 5],
    threshold: f64,
}

impl PentagonWaveform {
    /// Reconstructs the waveform of a trigger primitive.
    ///
    /// # Errors
    /// Returns [`WaveformError::Degenerate`] if `adc_peak <= threshold` or the
    /// TP has zero duration.
    pub fn reconstruct(
        tp: &TriggerPrimitive,
        threshold: f64,
        model: WaveformModel,
    ) -> Result<Self, WaveformError> {
        Self::from_summary(
            tp.time_start as f64,
            tp.time_peak() as f64,
            tp.time_end() as f64,
            tp.adc_peak,
            tp.adc_integral,
            threshold,
            model,
        )
    }

    /// Reconstructs a waveform from raw summary values.
    ///
    /// `time_peak` is clamped into `[time_start, time_end]`. A peak on either
    /// edge of the window (`samples_to_peak == 0` is common) leaves no rise
    /// or no fall span. The apex is then moved to the centre of the window
    /// and the interior vertices are placed symmetrically around it, so the
    /// amplitude is still `threshold` at both window ends. Such a waveform
    /// does not reach `adc_peak` at the recorded `time_peak`.
    ///
    /// # Errors
    /// See [`Self::reconstruct`].
    #[allow(clippy::too_many_arguments)]
    pub fn from_summary(
        time_start: f64,
        time_peak: f64,
        time_end: f64,
        adc_peak: f64,
        adc_integral: f64,
        threshold: f64,
        model: WaveformModel,
    ) -> Result<Self, WaveformError> {
        let degenerate = |reason| WaveformError::Degenerate {
            reason,
            adc_peak,
            threshold,
        };

        let inputs = [time_start, time_peak, time_end, adc_peak, threshold];
        if inputs.iter().any(|v| !v.is_finite()) {
            return Err(degenerate(DegenerateReason::NonFinite));
        }
        if time_end <= time_start {
            return Err(degenerate(DegenerateReason::ZeroDuration));
        }
        if adc_peak <= threshold {
            return Err(degenerate(DegenerateReason::PeakBelowThreshold));
        }

        let mut t_peak = time_peak.clamp(time_start, time_end);
        if t_peak <= time_start || t_peak >= time_end {
            t_peak = 0.5 * (time_start + time_end);
        }
        let t1 = time_start + VERTEX_FRACTION * (t_peak - time_start);
        let t2 = t_peak + VERTEX_FRACTION * (time_end - t_peak);
        let amplitude = adc_peak - threshold;

        let height = match model {
            WaveformModel::FixedFraction => FIXED_HEIGHT_FRACTION * amplitude,
            WaveformModel::AreaOptimized => {
                let target = if adc_integral.is_finite() {
                    adc_integral
                } else {
                    0.0
                };
                let residual = |h: f64| {
                    let shape = Self::with_height(
                        time_start, t1, t_peak, t2, time_end, adc_peak, threshold, h,
                    );
                    let diff = shape.total_area() - target;
                    diff * diff
                };
                minimize_bounded(residual, 0.0, amplitude)
            }
        };

        Ok(Self::with_height(
            time_start, t1, t_peak, t2, time_end, adc_peak, threshold, height,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn with_height(
        t0: f64,
        t1: f64,
        tp: f64,
        t2: f64,
        t3: f64,
        adc_peak: f64,
        threshold: f64,
        height: f64,
    ) -> Self {
        Self {
            vertices: [
                (t0, threshold),
                (t1, threshold + height),
                (tp, adc_peak),
                (t2, threshold + height),
                (t3, threshold),
            ],
            threshold,
        }
    }

    /// The five `(time, amplitude)` vertices in time order.
    #[must_use]
    pub fn vertices(&self) -> &[(f64, f64); 5] {
        &self.vertices
    }

    /// Baseline the waveform rests on.
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Start of the active window.
    #[must_use]
    pub fn time_start(&self) -> f64 {
        self.vertices[0].0
    }

    /// End of the active window.
    #[must_use]
    pub fn time_end(&self) -> f64 {
        self.vertices[4].0
    }

    /// Interpolated amplitude at time `t`; zero outside the active window.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn amplitude_at(&self, t: f64) -> f64 {
        if t < self.time_start() || t > self.time_end() {
            return 0.0;
        }
        for pair in self.vertices.windows(2) {
            let ((ta, ya), (tb, yb)) = (pair[0], pair[1]);
            if t == tb {
                return yb;
            }
            if t < tb {
                let span = tb - ta;
                if span <= 0.0 {
                    return ya.max(yb);
                }
                return ya + (yb - ya) * (t - ta) / span;
            }
        }
        self.threshold
    }

    /// Area of the pentagon above the threshold line.
    #[must_use]
    pub fn area_above_threshold(&self) -> f64 {
        polygon_area(&self.vertices)
    }

    /// Rectangular area between zero and the threshold over the window.
    #[must_use]
    pub fn offset_area(&self) -> f64 {
        self.threshold * (self.time_end() - self.time_start())
    }

    /// Pentagon area plus the baseline offset: the model's `adc_integral`.
    #[must_use]
    pub fn total_area(&self) -> f64 {
        self.area_above_threshold() + self.offset_area()
    }
}

/// Shoelace area of a simple polygon. The last vertex connects back to the
/// first.
#[must_use]
pub fn polygon_area(points: &[(f64, f64)]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0.0;
    for (i, &(x0, y0)) in points.iter().enumerate() {
        let (x1, y1) = points[(i + 1) % points.len()];
        twice += x0 * y1 - x1 * y0;
    }
    0.5 * twice.abs()
}

/// Golden-section search for the minimum of `f` on `[lo, hi]`.
///
/// Assumes `f` is unimodal on the interval.
pub fn minimize_bounded<F: Fn(f64) -> f64>(f: F, lo: f64, hi: f64) -> f64 {
    let (mut a, mut b) = if lo <= hi { (lo, hi) } else { (hi, lo) };
    let tolerance = 1e-10 * (1.0 + b.abs());

    let mut c = b - GOLDEN_RATIO_CONJUGATE * (b - a);
    let mut d = a + GOLDEN_RATIO_CONJUGATE * (b - a);
    let mut fc = f(c);
    let mut fd = f(d);

    for _ in 0..MAX_ITERATIONS {
        if (b - a).abs() <= tolerance {
            break;
        }
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - GOLDEN_RATIO_CONJUGATE * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + GOLDEN_RATIO_CONJUGATE * (b - a);
            fd = f(d);
        }
    }

    // The bracket may have collapsed onto an edge; compare with the bounds.
    let mid = 0.5 * (a + b);
    [(mid, f(mid)), (lo, f(lo)), (hi, f(hi))]
        .into_iter()
        .fold((mid, f64::INFINITY), |best, cand| if cand.1 < best.1 { cand } else { best })
        .0
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use approx::assert_relative_eq;

    fn reference(model: WaveformModel, integral: f64) -> PentagonWaveform {
        PentagonWaveform::from_summary(0.0, 5.0, 10.0, 200.0, integral, 60.0, model).unwrap()
    }

    #[test]
    fn test_endpoints_sit_on_threshold() {
        for model in [WaveformModel::FixedFraction, WaveformModel::AreaOptimized] {
            let wf = reference(model, 1300.0);
            assert_eq!(wf.amplitude_at(0.0), 60.0);
            assert_eq!(wf.amplitude_at(10.0), 60.0);
            assert_eq!(wf.amplitude_at(5.0), 200.0);
        }
    }

    #[test]
    fn test_zero_outside_window() {
        let wf = reference(WaveformModel::FixedFraction, 0.0);
        assert_eq!(wf.amplitude_at(-1.0), 0.0);
        assert_eq!(wf.amplitude_at(11.0), 0.0);
    }

    #[test]
    fn test_fixed_fraction_vertices() {
        let wf = reference(WaveformModel::FixedFraction, 0.0);
        let v = wf.vertices();
        assert_eq!(v[1], (2.5, 60.0 + 0.6 * 140.0));
        assert_eq!(v[3], (7.5, 60.0 + 0.6 * 140.0));
        assert_relative_eq!(wf.amplitude_at(1.25), 60.0 + 0.3 * 140.0, epsilon = 1e-12);
    }

    #[test]
    fn test_area_optimized_matches_integral() {
        // Total area is 950 + 5h on h in [0, 140].
        let wf = reference(WaveformModel::AreaOptimized, 1300.0);
        assert_relative_eq!(wf.total_area(), 1300.0, max_relative = 0.01);
        assert_relative_eq!(wf.vertices()[1].1, 130.0, epsilon = 1e-4);
    }

    #[test]
    fn test_area_optimized_clamps_to_bounds() {
        let low = reference(WaveformModel::AreaOptimized, 100.0);
        assert_relative_eq!(low.vertices()[1].1, 60.0, epsilon = 1e-6);
        let high = reference(WaveformModel::AreaOptimized, 1e6);
        assert_relative_eq!(high.vertices()[1].1, 200.0, epsilon = 1e-6);
    }

    #[test]
    fn test_area_decomposition() {
        let wf = reference(WaveformModel::FixedFraction, 0.0);
        assert_relative_eq!(wf.offset_area(), 600.0);
        assert_relative_eq!(wf.area_above_threshold(), 350.0 + 5.0 * 84.0, epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_inputs() {
        let below = PentagonWaveform::from_summary(
            0.0, 5.0, 10.0, 50.0, 400.0, 60.0, WaveformModel::AreaOptimized,
        );
        assert!(matches!(
            below,
            Err(WaveformError::Degenerate {
                reason: DegenerateReason::PeakBelowThreshold,
                ..
            })
        ));
        let zero = PentagonWaveform::from_summary(
            4.0, 4.0, 4.0, 200.0, 400.0, 60.0, WaveformModel::FixedFraction,
        );
        assert!(matches!(
            zero,
            Err(WaveformError::Degenerate {
                reason: DegenerateReason::ZeroDuration,
                ..
            })
        ));
    }

    #[test]
    fn test_peak_on_edge_recentres() {
        let wf = PentagonWaveform::from_summary(
            0.0, 0.0, 10.0, 200.0, 1300.0, 60.0, WaveformModel::FixedFraction,
        )
        .unwrap();
        assert_eq!(wf.vertices()[2], (5.0, 200.0));
        assert_eq!(wf.amplitude_at(0.0), 60.0);
        assert!(wf.vertices().windows(2).all(|p| p[0].0 < p[1].0));

        // Peak reported on the first sample.
        let tp = TriggerPrimitive::new(1000, 10, 0, 1700, 1300.0, 200.0, 0).unwrap();
        let wf = PentagonWaveform::reconstruct(&tp, 60.0, WaveformModel::AreaOptimized).unwrap();
        assert_eq!(wf.vertices()[2], (1005.0, 200.0));
        assert_eq!(wf.amplitude_at(1000.0), 60.0);
        assert_eq!(wf.amplitude_at(1010.0), 60.0);
    }

    #[test]
    fn test_peak_beyond_window_is_clamped() {
        let wf = PentagonWaveform::from_summary(
            0.0, 40.0, 10.0, 200.0, 1300.0, 60.0, WaveformModel::AreaOptimized,
        )
        .unwrap();
        assert_eq!(wf.vertices()[2].0, 5.0);
        assert_eq!(wf.amplitude_at(10.0), 60.0);
    }

    #[test]
    fn test_reconstruct_from_tp() {
        let tp = TriggerPrimitive::new(1000, 10, 5, 1700, 1300.0, 200.0, 0).unwrap();
        let wf = PentagonWaveform::reconstruct(&tp, 60.0, WaveformModel::AreaOptimized).unwrap();
        assert_eq!(wf.time_start(), 1000.0);
        assert_eq!(wf.time_end(), 1010.0);
        assert_eq!(wf.amplitude_at(1005.0), 200.0);
    }

    #[test]
    fn test_polygon_area() {
        let square = [(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0)];
        assert_relative_eq!(polygon_area(&square), 4.0);
        assert_eq!(polygon_area(&square[..2]), 0.0);
    }

    #[test]
    fn test_minimize_bounded_quadratic() {
        let x = minimize_bounded(|x| (x - 3.0).powi(2), 0.0, 10.0);
        assert_relative_eq!(x, 3.0, epsilon = 1e-6);
    }
}
