use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::objects::FilterRules;
use crate::segmentation::SegmentationMode;

// ---------------------------------------------------------------------------
// Channel layout
// ---------------------------------------------------------------------------

/// A measurement channel: 1-based index plus the label used in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub index: usize,
    pub label: String,
}

/// Which channels of a series feed segmentation and measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelLayout {
    /// Channel handed to the segmentation backend.
    pub structural: usize,
    pub measurement_a: ChannelSpec,
    pub measurement_b: ChannelSpec,
}

impl Default for ChannelLayout {
    fn default() -> Self {
        Self {
            structural: 2,
            measurement_a: ChannelSpec {
                index: 3,
                label: "GFP".to_string(),
            },
            measurement_b: ChannelSpec {
                index: 2,
                label: "mCherry".to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Border policy
// ---------------------------------------------------------------------------

/// Axes whose outer faces disqualify an object that touches them.
///
/// Depth is exempt by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BorderPolicy {
    pub x: bool,
    pub y: bool,
    pub z: bool,
}

impl Default for BorderPolicy {
    fn default() -> Self {
        Self {
            x: true,
            y: true,
            z: false,
        }
    }
}

impl BorderPolicy {
    /// No axis is checked.
    pub fn disabled() -> Self {
        Self {
            x: false,
            y: false,
            z: false,
        }
    }

    pub fn all_axes() -> Self {
        Self {
            x: true,
            y: true,
            z: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Segmentation backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Executable wrapping the segmentation model.
    pub program: PathBuf,
    /// Arguments placed before the generated ones.
    pub args: Vec<String>,
    pub model: String,
    pub mode: SegmentationMode,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("omnipose-segment"),
            args: Vec::new(),
            model: "bact_fluor_omni".to_string(),
            mode: SegmentationMode::ThreeD,
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

/// Everything a run needs besides the input directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// File-name suffix of acquisitions to process.
    pub extension: String,
    /// Expected object diameter in calibrated units.
    pub target_diameter: f64,
    /// Objects smaller than this (unit³) are dropped. `<= 0` disables the rule.
    pub min_volume: f64,
    pub channels: ChannelLayout,
    /// 1-based time point analysed in time-lapse series.
    pub frame: usize,
    pub border: BorderPolicy,
    pub object_prefix: String,
    /// Radius of the per-slice median applied before segmentation; 0 disables.
    pub prefilter_radius: usize,
    pub segmenter: SegmenterConfig,
    pub report_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extension: "parquet".to_string(),
            target_diameter: 1.0,
            min_volume: 0.1,
            channels: ChannelLayout::default(),
            frame: 1,
            border: BorderPolicy::default(),
            object_prefix: "Bact_".to_string(),
            prefilter_radius: 3,
            segmenter: SegmenterConfig::default(),
            report_name: "Results.csv".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Read a JSON config; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: PipelineConfig = serde_json::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let bad = |msg: String| Err(PipelineError::Config(msg));
        if !self.target_diameter.is_finite() || self.target_diameter <= 0.0 {
            return bad(format!(
                "target diameter must be positive, got {}",
                self.target_diameter
            ));
        }
        if self.min_volume.is_nan() {
            return bad("minimum volume is NaN".to_string());
        }
        let layout = &self.channels;
        if layout.structural == 0 || layout.measurement_a.index == 0 || layout.measurement_b.index == 0
        {
            return bad("channel indices are 1-based".to_string());
        }
        if self.frame == 0 {
            return bad("frame index is 1-based".to_string());
        }
        if self.object_prefix.is_empty() {
            return bad("object prefix must not be empty".to_string());
        }
        if self.extension.trim_start_matches('.').is_empty() {
            return bad("file extension must not be empty".to_string());
        }
        if self.report_name.is_empty() {
            return bad("report name must not be empty".to_string());
        }
        Ok(())
    }

    pub fn filter_rules(&self) -> FilterRules {
        FilterRules {
            min_volume: self.min_volume,
            border: self.border,
            prefix: self.object_prefix.clone(),
        }
    }

    /// Report header, one entry per column.
    pub fn report_header(&self) -> [String; 7] {
        let a = &self.channels.measurement_a.label;
        let b = &self.channels.measurement_b.label;
        [
            "Image name".to_string(),
            "Series number".to_string(),
            "Object Name".to_string(),
            format!("{a} mean intensity"),
            format!("{a} median intensity"),
            format!("{b} mean intensity"),
            format!("{b} median intensity"),
        ]
    }
}
