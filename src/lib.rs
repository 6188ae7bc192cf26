//! Batch measurement of fluorescent bacteria in 3D microscopy acquisitions.
//!
//! Each series is segmented by an external model, its objects are filtered
//! by volume and border contact, and the survivors are measured on two
//! fluorescence channels. One `;`-separated report covers the whole run.

pub mod cancel;
pub mod config;
pub mod data;
pub mod discovery;
pub mod error;
pub mod objects;
pub mod pipeline;
pub mod report;
pub mod segmentation;

pub use cancel::CancelToken;
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{analyse_series, Pipeline, RunSummary};
