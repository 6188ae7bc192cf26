use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};

use bact_measure::data::loader::FileVolumeProvider;
use bact_measure::report::ParquetPopulationStore;
use bact_measure::segmentation::CommandSegmenter;
use bact_measure::{CancelToken, Pipeline, PipelineConfig, PipelineError};

/// Segment bacteria in every acquisition of a folder and measure their
/// fluorescence on two channels.
#[derive(Parser, Debug)]
#[command(name = "bact-measure", version, long_about = None)]
struct Args {
    /// Folder with the acquisitions; a folder picker opens when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// JSON config file; missing fields take their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// File extension to process (e.g. "parquet", "json")
    #[arg(long)]
    extension: Option<String>,

    /// Expected bacterium diameter in calibrated units
    #[arg(long)]
    diameter: Option<f64>,

    /// Minimum object volume in calibrated units³ (<= 0 keeps everything)
    #[arg(long)]
    min_volume: Option<f64>,

    /// Segmentation program
    #[arg(long)]
    segmenter: Option<PathBuf>,

    /// Extra argument passed to the segmentation program (repeatable)
    #[arg(long = "segmenter-arg", allow_hyphen_values = true)]
    segmenter_arg: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

impl Args {
    fn to_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(extension) = &self.extension {
            config.extension = extension.clone();
        }
        if let Some(diameter) = self.diameter {
            config.target_diameter = diameter;
        }
        if let Some(min_volume) = self.min_volume {
            config.min_volume = min_volume;
        }
        if let Some(program) = &self.segmenter {
            config.segmenter.program = program.clone();
        }
        if !self.segmenter_arg.is_empty() {
            config.segmenter.args = self.segmenter_arg.clone();
        }
        Ok(config)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let config = args.to_config().context("loading configuration")?;

    let input = match &args.input {
        Some(dir) => dir.clone(),
        None => match rfd::FileDialog::new()
            .set_title("Choose the folder with the acquisitions")
            .pick_folder()
        {
            Some(dir) => dir,
            None => {
                info!("no folder chosen, nothing to do");
                return Ok(());
            }
        },
    };

    let segmenter = CommandSegmenter::new(config.segmenter.clone());
    segmenter.check_available()?;

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("interrupt received, stopping...");
        trigger.cancel();
    })
    .context("installing interrupt handler")?;

    info!("processing {}", input.display());
    let mut pipeline =
        Pipeline::new(config, FileVolumeProvider, segmenter, ParquetPopulationStore)?
            .with_cancel(cancel);

    match pipeline.run(&input) {
        Ok(summary) => {
            info!(
                "done: {} files ({} skipped), {} series ({} without records), {} objects",
                summary.files,
                summary.skipped_files,
                summary.series,
                summary.failed_series,
                summary.records
            );
            if let Some(report) = summary.report {
                info!("report: {}", report.display());
            }
            Ok(())
        }
        Err(PipelineError::Cancelled) => {
            anyhow::bail!("run cancelled, no report written")
        }
        Err(e) => Err(e.into()),
    }
}
