//! Fixed-size channel x time rasterization of a cluster.
//!
//! Rows are time ticks, columns are channels. Channels are re-indexed densely
//! over the unique channels of the cluster, so the channel axis has no gaps
//! whatever the absolute channel numbers are. The cluster's bounding box is
//! centred in the image; overlapping TPs combine with `max`, never `sum`.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]

use crate::waveform::{PentagonWaveform, WaveformModel};
use log::trace;
use ndarray::Array2;
use tpraster_core::error::RasterError;
use tpraster_core::image::{ImageConfig, OversizePolicy};
use tpraster_core::primitive::Primitive;
use tpraster_detector::{ChannelMap, PlaneThresholds};

/// A rendered cluster image plus bookkeeping.
#[derive(Clone, Debug)]
pub struct RasterOutput {
    /// `(height, width)` image in raw ADC units.
    pub image: Array2<f32>,
    /// TPs whose waveform was degenerate and contributed nothing.
    pub degenerate_tps: usize,
    /// Non-zero samples that fell outside the image.
    pub clipped_samples: usize,
}

/// Paints reconstructed waveforms onto a fixed-size grid.
#[derive(Clone, Debug, Default)]
pub struct ImageRasterizer {
    config: ImageConfig,
    model: WaveformModel,
}

impl ImageRasterizer {
    /// Create a rasterizer for the given image shape and waveform model.
    #[must_use]
    pub fn new(config: ImageConfig, model: WaveformModel) -> Self {
        Self { config, model }
    }

    /// Image configuration.
    #[must_use]
    pub fn config(&self) -> &ImageConfig {
        &self.config
    }

    /// Waveform model.
    #[must_use]
    pub fn model(&self) -> WaveformModel {
        self.model
    }

    /// Renders a cluster.
    ///
    /// Zero TPs, or TPs whose waveforms are all degenerate, produce an
    /// all-zero image.
    ///
    /// # Errors
    /// Returns [`RasterError::ClusterTooLarge`] when the cluster's extent
    /// exceeds the image and the oversize policy is
    /// [`OversizePolicy::Reject`].
    pub fn rasterize<P: Primitive>(
        &self,
        tps: &[P],
        channel_map: &ChannelMap,
        thresholds: &PlaneThresholds,
    ) -> Result<RasterOutput, RasterError> {
        let (height, width) = (self.config.height, self.config.width);
        let mut output = RasterOutput {
            image: Array2::zeros((height, width)),
            degenerate_tps: 0,
            clipped_samples: 0,
        };
        if tps.is_empty() {
            trace!("rasterize invoked on zero trigger primitives");
            return Ok(output);
        }

        let mut channels: Vec<u32> = tps.iter().map(Primitive::channel).collect();
        channels.sort_unstable();
        channels.dedup();

        let margin = self.config.time_margin.max(0);
        let t_min = tps.iter().map(|p| p.tp().time_start).min().unwrap_or(0) - margin;
        let t_max = tps.iter().map(|p| p.tp().time_end()).max().unwrap_or(0) + margin;
        let n_ticks = (t_max - t_min + 1) as usize;
        let n_channels = channels.len();

        if (n_channels > width || n_ticks > height) && self.config.oversize == OversizePolicy::Reject
        {
            return Err(RasterError::ClusterTooLarge {
                channels: n_channels,
                ticks: n_ticks,
                width,
                height,
            });
        }

        let col_offset = centring_offset(width, n_channels);
        let row_offset = centring_offset(height, n_ticks);

        for p in tps {
            let tp = p.tp();
            let threshold = thresholds.for_plane(channel_map.plane_of(tp.channel));
            let waveform = match PentagonWaveform::reconstruct(tp, threshold, self.model) {
                Ok(waveform) => waveform,
                Err(err) => {
                    trace!("channel {} tick {}: {err}", tp.channel, tp.time_start);
                    output.degenerate_tps += 1;
                    continue;
                }
            };

            let Ok(dense) = channels.binary_search(&tp.channel) else {
                continue;
            };
            let col = dense as i64 + col_offset;

            // Amplitude is non-zero exactly on the active ticks; margin ticks
            // sample zero.
            let (start, end) = (tp.time_start, tp.time_end());
            let active = (end - start + 1) as usize;
            if col < 0 || col >= width as i64 {
                output.clipped_samples += active;
                continue;
            }
            // Ticks landing in rows 0..height.
            let first_row_tick = t_min - row_offset;
            let last_row_tick = first_row_tick + height as i64 - 1;
            let visible = (end.min(last_row_tick) - start.max(first_row_tick) + 1).max(0) as usize;
            output.clipped_samples += active - visible;

            let from = (start - margin).max(first_row_tick);
            let to = (end + margin).min(last_row_tick);
            for t in from..=to {
                let amplitude = waveform.amplitude_at(t as f64) as f32;
                let pixel = &mut output.image[[(t - first_row_tick) as usize, col as usize]];
                *pixel = pixel.max(amplitude);
            }
        }

        Ok(output)
    }
}

/// Offset that centres `extent` cells in `size` cells. Negative when the
/// extent does not fit; the excess is cut evenly from both ends.
#[inline]
fn centring_offset(size: usize, extent: usize) -> i64 {
    (size as i64 - extent as i64) / 2
}

/// Divides an image by its own maximum. All-zero images are left unchanged.
pub fn normalize_by_max(image: &mut Array2<f32>) {
    let max = image.iter().copied().fold(0.0f32, f32::max);
    if max > 0.0 {
        image.mapv_inplace(|v| v / max);
    }
}
