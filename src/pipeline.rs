use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::PipelineConfig;
use crate::data::loader::ChannelVolumeProvider;
use crate::data::model::SeriesImage;
use crate::data::preprocess::median_filter_slices;
use crate::discovery::{file_info, list_files};
use crate::error::{PipelineError, Result};
use crate::objects::{filter, measure_population, MeasuredPopulation, ObjectPopulation};
use crate::report::{PopulationStore, ResultAggregator, ResultTable};
use crate::segmentation::{diameter_in_pixels, Segmenter};

// ---------------------------------------------------------------------------
// Run summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub files: usize,
    /// Files abandoned because their metadata could not be read.
    pub skipped_files: usize,
    pub series: usize,
    /// Series that produced no records because a step failed.
    pub failed_series: usize,
    pub records: usize,
    /// Written report, `None` when there was nothing to do.
    pub report: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Per-series processing
// ---------------------------------------------------------------------------

/// Segment, build, filter and measure one series.
///
/// The series is consumed; its channel data is released before this returns,
/// whatever the outcome.
pub fn analyse_series(
    config: &PipelineConfig,
    segmenter: &mut dyn Segmenter,
    cancel: &CancelToken,
    path: &Path,
    series: SeriesImage,
) -> Result<MeasuredPopulation> {
    let calibration = series.calibration.clone();
    let channels = series
        .channels(&config.channels, config.frame)
        .map_err(|e| PipelineError::SeriesMetadata {
            path: path.to_path_buf(),
            reason: format!("{e:#}"),
        })?;
    drop(series);

    let structural = median_filter_slices(&channels.structural, config.prefilter_radius);
    let diameter_px = diameter_in_pixels(config.target_diameter, &calibration);
    debug!(
        "segmenting {:?} with diameter {diameter_px}px",
        structural.dims()
    );

    cancel.check()?;
    let labels = segmenter.segment(&structural, diameter_px, config.segmenter.mode, cancel)?;
    if labels.dims() != structural.dims() {
        return Err(PipelineError::SegmentationFailure(format!(
            "labels of {:?} do not match input of {:?}",
            labels.dims(),
            structural.dims()
        )));
    }
    drop(structural);

    let population = ObjectPopulation::build(labels, &calibration)?;
    let filtered = filter(population, &config.filter_rules());
    let s = filtered.summary();
    info!(
        "  {} candidates, {} below {} {}³, {} on border, {} kept",
        s.candidates,
        s.too_small,
        config.min_volume,
        calibration.unit,
        s.touching_border,
        s.kept
    );

    measure_population(filtered, &channels.measurement_a, &channels.measurement_b)
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Sequential batch over every matching file of a directory.
pub struct Pipeline<P, S, T> {
    config: PipelineConfig,
    provider: P,
    segmenter: S,
    store: T,
    cancel: CancelToken,
}

impl<P, S, T> Pipeline<P, S, T>
where
    P: ChannelVolumeProvider,
    S: Segmenter,
    T: PopulationStore,
{
    pub fn new(config: PipelineConfig, provider: P, segmenter: S, store: T) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            provider,
            segmenter,
            store,
            cancel: CancelToken::new(),
        })
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Process `input_dir` and write the report next to the files.
    ///
    /// Per-file and per-series failures are logged and skipped. An unreadable
    /// directory, a report that cannot be written, or cancellation end the run
    /// with an error.
    pub fn run(&mut self, input_dir: &Path) -> Result<RunSummary> {
        let Self {
            config,
            provider,
            segmenter,
            store,
            cancel,
        } = self;

        let archive_suffix = format!(".{}", store.extension().to_lowercase());
        let mut files = list_files(input_dir, &config.extension)?;
        let report_name = config.report_name.to_lowercase();
        files.retain(|f| {
            let name = f
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("")
                .to_lowercase();
            if name.ends_with(&archive_suffix) {
                debug!("ignoring object archive {}", f.display());
                return false;
            }
            if name == report_name {
                debug!("ignoring previous report {}", f.display());
                return false;
            }
            true
        });
        let mut summary = RunSummary {
            files: files.len(),
            ..RunSummary::default()
        };
        if files.is_empty() {
            info!(
                "no *.{} files in {}, nothing to do",
                config.extension.trim_start_matches('.'),
                input_dir.display()
            );
            return Ok(summary);
        }

        let mut aggregator = ResultAggregator::new(Box::new(&mut *store));

        for (index, file) in files.iter().enumerate() {
            cancel.check()?;
            info!("file {}/{}: {}", index + 1, files.len(), file.display());
            let (folder, basename) = file_info(file);

            let mut reader = match provider.open(file) {
                Ok(reader) => reader,
                Err(e) => {
                    warn!("skipping {}: {e}", file.display());
                    summary.skipped_files += 1;
                    continue;
                }
            };

            let series_count = reader.series_count();
            for series_index in 0..series_count {
                cancel.check()?;
                info!("series {}/{}", series_index + 1, series_count);

                let series = match reader.read_series(series_index) {
                    Ok(series) => series,
                    Err(e) => {
                        warn!("abandoning rest of {}: {e}", file.display());
                        summary.skipped_files += 1;
                        break;
                    }
                };
                summary.series += 1;

                let outcome = analyse_series(config, &mut *segmenter, cancel, file, series)
                    .and_then(|measured| {
                        aggregator.record(&folder, &basename, series_index, &measured)
                    });
                match outcome {
                    Ok(added) => summary.records += added,
                    Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                    Err(e @ PipelineError::SeriesMetadata { .. }) => {
                        warn!("abandoning rest of {}: {e}", file.display());
                        summary.failed_series += 1;
                        summary.skipped_files += 1;
                        break;
                    }
                    Err(e) => {
                        warn!(
                            "{} series {}: no records ({e})",
                            basename,
                            series_index + 1
                        );
                        summary.failed_series += 1;
                    }
                }
            }
        }

        let table = aggregator.finalize();
        let report = input_dir.join(&config.report_name);
        write_report(&table, &report, config)?;
        info!("wrote {} records to {}", table.len(), report.display());
        summary.report = Some(report);
        Ok(summary)
    }
}

fn write_report(table: &ResultTable, path: &Path, config: &PipelineConfig) -> Result<()> {
    table
        .write_csv(path, &config.report_header())
        .map_err(|e| PipelineError::Persistence {
            path: path.to_path_buf(),
            reason: format!("{e:#}"),
        })
}
