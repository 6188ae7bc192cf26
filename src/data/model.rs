use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::volume::{Calibration, Dims, Volume};
use crate::config::ChannelLayout;

// ---------------------------------------------------------------------------
// SeriesGeometry – hyperstack extent of one series
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesGeometry {
    pub width: usize,
    pub height: usize,
    pub slices: usize,
    pub channels: usize,
    pub frames: usize,
}

impl SeriesGeometry {
    /// Extent of one channel at one time point.
    pub fn volume_dims(&self) -> Dims {
        Dims::new(self.width, self.height, self.slices)
    }

    /// Samples held by one channel across all frames.
    pub fn samples_per_channel(&self) -> usize {
        self.volume_dims().len() * self.frames
    }
}

// ---------------------------------------------------------------------------
// SeriesImage – one series of an acquisition file
// ---------------------------------------------------------------------------

/// One multi-channel, optionally time-lapse, 3D series.
///
/// `stacks[c]` holds channel `c + 1`, laid out frame-major, then z, y, x.
#[derive(Debug, Clone)]
pub struct SeriesImage {
    pub name: String,
    pub calibration: Calibration,
    pub geometry: SeriesGeometry,
    pub stacks: Vec<Vec<f32>>,
}

/// The three co-registered volumes the pipeline works on.
#[derive(Debug, Clone)]
pub struct SeriesChannels {
    pub structural: Volume,
    pub measurement_a: Volume,
    pub measurement_b: Volume,
}

impl SeriesImage {
    /// Check calibration and that every channel stack matches the geometry.
    pub fn validate(&self) -> Result<()> {
        self.calibration
            .validate()
            .with_context(|| format!("series '{}'", self.name))?;
        let g = &self.geometry;
        if g.volume_dims().is_empty() || g.frames == 0 {
            bail!("series '{}' has an empty extent: {g:?}", self.name);
        }
        if self.stacks.len() != g.channels {
            bail!(
                "series '{}' declares {} channels but carries {}",
                self.name,
                g.channels,
                self.stacks.len()
            );
        }
        let expected = g.samples_per_channel();
        for (c, stack) in self.stacks.iter().enumerate() {
            if stack.len() != expected {
                bail!(
                    "series '{}' channel {}: expected {expected} samples, got {}",
                    self.name,
                    c + 1,
                    stack.len()
                );
            }
        }
        Ok(())
    }

    /// Duplicate one channel at one time point (both 1-based) into a volume.
    pub fn channel_volume(&self, channel: usize, frame: usize) -> Result<Volume> {
        let g = &self.geometry;
        if channel == 0 || channel > g.channels {
            bail!(
                "channel {channel} out of range for series '{}' with {} channels",
                self.name,
                g.channels
            );
        }
        if frame == 0 || frame > g.frames {
            bail!(
                "frame {frame} out of range for series '{}' with {} frames",
                self.name,
                g.frames
            );
        }
        let dims = g.volume_dims();
        let start = (frame - 1) * dims.len();
        let data = self.stacks[channel - 1][start..start + dims.len()].to_vec();
        Volume::new(dims, self.calibration.clone(), data)
    }

    /// Extract the structural and both measurement channels for one frame.
    pub fn channels(&self, layout: &ChannelLayout, frame: usize) -> Result<SeriesChannels> {
        Ok(SeriesChannels {
            structural: self.channel_volume(layout.structural, frame)?,
            measurement_a: self.channel_volume(layout.measurement_a.index, frame)?,
            measurement_b: self.channel_volume(layout.measurement_b.index, frame)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_channel_series() -> SeriesImage {
        let geometry = SeriesGeometry {
            width: 2,
            height: 2,
            slices: 1,
            channels: 2,
            frames: 2,
        };
        SeriesImage {
            name: "s".into(),
            calibration: Calibration::default(),
            geometry,
            stacks: vec![
                (0..8).map(|v| v as f32).collect(),
                (100..108).map(|v| v as f32).collect(),
            ],
        }
    }

    #[test]
    fn channel_volume_picks_frame() {
        let series = two_channel_series();
        series.validate().unwrap();
        let vol = series.channel_volume(2, 2).unwrap();
        assert_eq!(vol.data(), &[104.0, 105.0, 106.0, 107.0]);
    }

    #[test]
    fn channel_volume_rejects_out_of_range() {
        let series = two_channel_series();
        assert!(series.channel_volume(0, 1).is_err());
        assert!(series.channel_volume(3, 1).is_err());
        assert!(series.channel_volume(1, 3).is_err());
    }

    #[test]
    fn validate_rejects_short_stack() {
        let mut series = two_channel_series();
        series.stacks[1].pop();
        assert!(series.validate().is_err());
    }
}
