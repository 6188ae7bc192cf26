use std::path::PathBuf;

use thiserror::Error;

use crate::data::volume::Dims;

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Failures the pipeline distinguishes between.
///
/// Per-series and per-object variants are logged and swallowed by the
/// orchestrator; `Config`, `Discovery` and `Cancelled` end the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input directory could not be listed.
    #[error("cannot read input directory {path}: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Series count, calibration or geometry of a file is unusable.
    #[error("series metadata of {path}: {reason}")]
    SeriesMetadata { path: PathBuf, reason: String },

    /// The segmentation backend failed or returned something unusable.
    #[error("segmentation failed: {0}")]
    SegmentationFailure(String),

    /// The labeled volume contains no positive label.
    #[error("segmentation produced no objects")]
    SegmentationEmpty,

    /// An object has no member voxel, so no statistic is defined.
    #[error("object {label} has no member voxels")]
    EmptyMembership { label: u32 },

    /// A channel volume does not line up with the labeled volume.
    #[error("volume of {found:?} does not match labels of {expected:?}")]
    ShapeMismatch { expected: Dims, found: Dims },

    /// Invalid configuration or missing backend.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("failed to persist {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
