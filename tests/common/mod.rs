#![allow(dead_code)]

use std::ops::Range;
use std::path::Path;

use bact_measure::config::{ChannelLayout, ChannelSpec, PipelineConfig};
use bact_measure::data::loader::write_parquet;
use bact_measure::data::model::{SeriesGeometry, SeriesImage};
use bact_measure::data::volume::{Calibration, Dims, LabeledVolume, Volume};
use bact_measure::segmentation::{SegmentationMode, Segmenter};
use bact_measure::{CancelToken, PipelineError};

/// Constant B-channel intensity inside every series.
pub const CHANNEL_B_LEVEL: f32 = 2.5;

/// A box of voxels carrying one label.
#[derive(Debug, Clone)]
pub struct Blob {
    pub label: u32,
    pub x: Range<usize>,
    pub y: Range<usize>,
    pub z: Range<usize>,
}

impl Blob {
    pub fn new(label: u32, x: Range<usize>, y: Range<usize>, z: Range<usize>) -> Self {
        Self { label, x, y, z }
    }

    fn contains(&self, x: usize, y: usize, z: usize) -> bool {
        self.x.contains(&x) && self.y.contains(&y) && self.z.contains(&z)
    }
}

/// 0.1 × 0.1 × 1.0 µm voxels, so one voxel is 0.01 µm³.
pub fn calibration() -> Calibration {
    Calibration {
        voxel_width: 0.1,
        voxel_height: 0.1,
        voxel_depth: 1.0,
        unit: "micron".to_string(),
    }
}

/// Three-channel series whose channel 1 holds the ground-truth labels.
///
/// Channel 2 is flat at [`CHANNEL_B_LEVEL`]; channel 3 is `x + y`.
pub fn labeled_series(name: &str, dims: Dims, blobs: &[Blob]) -> SeriesImage {
    let geometry = SeriesGeometry {
        width: dims.width,
        height: dims.height,
        slices: dims.depth,
        channels: 3,
        frames: 1,
    };
    let labels = Volume::from_fn(dims, calibration(), |x, y, z| {
        blobs
            .iter()
            .find(|b| b.contains(x, y, z))
            .map_or(0.0, |b| b.label as f32)
    });
    let gradient = Volume::from_fn(dims, calibration(), |x, y, _| (x + y) as f32);
    SeriesImage {
        name: name.to_string(),
        calibration: calibration(),
        geometry,
        stacks: vec![
            labels.into_data(),
            vec![CHANNEL_B_LEVEL; dims.len()],
            gradient.into_data(),
        ],
    }
}

/// Three objects on a 10×10×4 grid: one survivor, one too small, one on the
/// x border.
pub fn reference_series(name: &str) -> SeriesImage {
    labeled_series(
        name,
        Dims::new(10, 10, 4),
        &[
            // 18 voxels, 0.18 µm³, interior.
            Blob::new(1, 2..5, 2..5, 1..3),
            // 4 voxels, 0.04 µm³.
            Blob::new(2, 7..8, 7..8, 0..4),
            // 24 voxels touching x = 0.
            Blob::new(3, 0..2, 6..9, 0..4),
        ],
    )
}

pub fn write_acquisition(dir: &Path, file_name: &str, series: &[SeriesImage]) {
    write_parquet(&dir.join(file_name), series).unwrap();
}

/// Default settings with the label channel wired to segmentation and the
/// prefilter off, so labels pass through unchanged.
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        channels: ChannelLayout {
            structural: 1,
            measurement_a: ChannelSpec {
                index: 3,
                label: "GFP".to_string(),
            },
            measurement_b: ChannelSpec {
                index: 2,
                label: "mCherry".to_string(),
            },
        },
        prefilter_radius: 0,
        ..PipelineConfig::default()
    }
}

/// Reads labels straight from the structural channel.
#[derive(Debug, Default)]
pub struct LabelSegmenter {
    pub calls: usize,
    /// Cancel this token after the given number of calls.
    pub cancel_after: Option<(usize, CancelToken)>,
}

impl Segmenter for LabelSegmenter {
    fn segment(
        &mut self,
        structural: &Volume,
        _diameter_px: u32,
        _mode: SegmentationMode,
        cancel: &CancelToken,
    ) -> Result<LabeledVolume, PipelineError> {
        cancel.check()?;
        self.calls += 1;
        if let Some((after, token)) = &self.cancel_after {
            if self.calls >= *after {
                token.cancel();
            }
        }
        Ok(LabeledVolume::from_fn(
            structural.dims(),
            structural.calibration().clone(),
            |x, y, z| *structural.get(x, y, z) as u32,
        ))
    }
}

/// Fails every call, as a crashed backend would.
#[derive(Debug, Default)]
pub struct BrokenSegmenter;

impl Segmenter for BrokenSegmenter {
    fn segment(
        &mut self,
        _structural: &Volume,
        _diameter_px: u32,
        _mode: SegmentationMode,
        _cancel: &CancelToken,
    ) -> Result<LabeledVolume, PipelineError> {
        Err(PipelineError::SegmentationFailure("model crashed".to_string()))
    }
}
