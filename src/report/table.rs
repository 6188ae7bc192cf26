use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use serde::Serialize;

use super::store::PopulationStore;
use crate::objects::MeasuredPopulation;

// ---------------------------------------------------------------------------
// MeasurementRecord – one report row
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementRecord {
    pub image_name: String,
    /// 1-based.
    pub series_number: usize,
    pub object_name: String,
    pub a_mean: f64,
    pub a_median: f64,
    pub b_mean: f64,
    pub b_median: f64,
}

// ---------------------------------------------------------------------------
// ResultTable – the run's report
// ---------------------------------------------------------------------------

/// Records in processing order: file, then series, then object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    records: Vec<MeasurementRecord>,
}

impl ResultTable {
    pub fn records(&self) -> &[MeasurementRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write a `;`-separated table with one header field per column.
    pub fn write_csv(&self, path: &Path, header: &[String]) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .from_path(path)
            .with_context(|| format!("creating {}", path.display()))?;
        writer.write_record(header).context("writing header")?;
        for record in &self.records {
            writer.serialize(record).context("writing record")?;
        }
        writer.flush().context("flushing report")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ResultAggregator – the only cross-series state of a run
// ---------------------------------------------------------------------------

/// Collects measurements across series and files, and persists each series'
/// surviving objects next to the source file.
pub struct ResultAggregator<'a> {
    store: Box<dyn PopulationStore + 'a>,
    records: Vec<MeasurementRecord>,
}

impl<'a> ResultAggregator<'a> {
    pub fn new(store: Box<dyn PopulationStore + 'a>) -> Self {
        Self {
            store,
            records: Vec::new(),
        }
    }

    /// Archive path for a series: `<folder>/<basename>_series<N+1>.<ext>`.
    pub fn archive_path(&self, folder: &Path, basename: &str, series_index: usize) -> PathBuf {
        folder.join(format!(
            "{basename}_series{}.{}",
            series_index + 1,
            self.store.extension()
        ))
    }

    /// Persist the series' geometry, then append one record per measured object.
    ///
    /// Nothing is appended when persistence fails, so the report never lists
    /// objects whose geometry was not saved. Returns the number of records added.
    pub fn record(
        &mut self,
        folder: &Path,
        basename: &str,
        series_index: usize,
        measured: &MeasuredPopulation,
    ) -> crate::error::Result<usize> {
        let path = self.archive_path(folder, basename, series_index);
        self.store.save(measured.population(), &path)?;
        debug!("saved {} objects to {}", measured.population().len(), path.display());

        let before = self.records.len();
        self.records
            .extend(measured.measurements().iter().map(|m| MeasurementRecord {
                image_name: basename.to_string(),
                series_number: series_index + 1,
                object_name: m.name.clone(),
                a_mean: m.channel_a.mean,
                a_median: m.channel_a.median,
                b_mean: m.channel_b.mean,
                b_median: m.channel_b.median,
            }));
        Ok(self.records.len() - before)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn finalize(self) -> ResultTable {
        ResultTable {
            records: self.records,
        }
    }
}
