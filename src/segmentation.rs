use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::config::SegmenterConfig;
use crate::data::volume::{Calibration, LabeledVolume, Volume};
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Segmenter trait
// ---------------------------------------------------------------------------

/// Whether the model segments the stack as a volume or slice by slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SegmentationMode {
    #[serde(rename = "2D")]
    TwoD,
    #[default]
    #[serde(rename = "3D")]
    ThreeD,
}

impl SegmentationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentationMode::TwoD => "2D",
            SegmentationMode::ThreeD => "3D",
        }
    }
}

/// Turns a structural volume into a labeled volume of the same shape.
///
/// Either a complete labeled volume comes back or the call fails; there are
/// no partial results.
pub trait Segmenter {
    fn segment(
        &mut self,
        structural: &Volume,
        diameter_px: u32,
        mode: SegmentationMode,
        cancel: &CancelToken,
    ) -> Result<LabeledVolume>;
}

/// Convert a calibrated diameter to whole pixels using the voxel width.
pub fn diameter_in_pixels(diameter: f64, calibration: &Calibration) -> u32 {
    let px = (diameter / calibration.voxel_width).round();
    if px.is_finite() && px >= 1.0 {
        px.min(u32::MAX as f64) as u32
    } else {
        1
    }
}

// ---------------------------------------------------------------------------
// External command backend
// ---------------------------------------------------------------------------

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs an external segmentation program, exchanging volumes as JSON files.
///
/// Invocation: `program <args...> --input IN --output OUT --diameter PX
/// --mode 3D --model MODEL`. The program reads a serialized [`Volume`] from
/// `IN` and writes a serialized [`LabeledVolume`] of the same extent to `OUT`.
#[derive(Debug, Clone)]
pub struct CommandSegmenter {
    config: SegmenterConfig,
}

impl CommandSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    /// Fail early when the program cannot be found.
    pub fn check_available(&self) -> Result<()> {
        let program = &self.config.program;
        let found = if program.components().count() > 1 || program.is_absolute() {
            program.is_file()
        } else {
            std::env::var_os("PATH")
                .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
                .unwrap_or(false)
        };
        if found {
            Ok(())
        } else {
            Err(PipelineError::Config(format!(
                "segmentation program not found: {}",
                program.display()
            )))
        }
    }

    fn wait(&self, command: &mut Command, cancel: &CancelToken) -> Result<std::process::ExitStatus> {
        let program = self.config.program.display().to_string();
        let mut child = command
            .spawn()
            .map_err(|e| PipelineError::SegmentationFailure(format!("spawning {program}: {e}")))?;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if cancel.is_cancelled() {
                debug!("killing {program} after cancellation");
                if let Err(e) = child.kill() {
                    warn!("could not kill {program}: {e}");
                }
                if let Err(e) = child.wait() {
                    warn!("could not reap {program}: {e}");
                }
                return Err(PipelineError::Cancelled);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn failure(context: &str, e: impl std::fmt::Display) -> PipelineError {
    PipelineError::SegmentationFailure(format!("{context}: {e}"))
}

fn stderr_tail(path: &Path) -> String {
    let text = fs::read_to_string(path).unwrap_or_default();
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(5)..].join(" | ")
}

impl Segmenter for CommandSegmenter {
    fn segment(
        &mut self,
        structural: &Volume,
        diameter_px: u32,
        mode: SegmentationMode,
        cancel: &CancelToken,
    ) -> Result<LabeledVolume> {
        cancel.check()?;
        let scratch = tempfile::Builder::new().prefix("bact-measure-").tempdir()?;
        let input = scratch.path().join("input.json");
        let output = scratch.path().join("labels.json");
        let log = scratch.path().join("stderr.log");

        let mut writer = BufWriter::new(File::create(&input)?);
        serde_json::to_writer(&mut writer, structural)
            .map_err(|e| failure("writing input volume", e))?;
        writer.flush()?;

        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .arg("--input")
            .arg(&input)
            .arg("--output")
            .arg(&output)
            .arg("--diameter")
            .arg(diameter_px.to_string())
            .arg("--mode")
            .arg(mode.as_str())
            .arg("--model")
            .arg(&self.config.model)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(File::create(&log)?));

        debug!("running {:?}", command);
        let status = self.wait(&mut command, cancel)?;
        if !status.success() {
            return Err(PipelineError::SegmentationFailure(format!(
                "{} exited with {status}: {}",
                self.config.program.display(),
                stderr_tail(&log)
            )));
        }

        let reader = BufReader::new(File::open(&output).map_err(|e| failure("opening labels", e))?);
        let labels: LabeledVolume =
            serde_json::from_reader(reader).map_err(|e| failure("parsing labels", e))?;
        labels.check_shape().map_err(|e| failure("labels", e))?;
        if labels.dims() != structural.dims() {
            return Err(PipelineError::SegmentationFailure(format!(
                "labels of {:?} do not match input of {:?}",
                labels.dims(),
                structural.dims()
            )));
        }
        Ok(labels)
    }
}
