use std::collections::BTreeMap;
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use arrow::array::{
    Array, ArrayRef, AsArray, Float32Array, Float32Builder, Float64Array, Int32Array, Int64Array,
    LargeListArray, ListArray, ListBuilder, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReaderBuilder, RowSelection};
use parquet::arrow::{ArrowWriter, ProjectionMask};
use serde::{Deserialize, Serialize};

use super::model::{SeriesGeometry, SeriesImage};
use super::volume::Calibration;
use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// Provider traits
// ---------------------------------------------------------------------------

/// Opens acquisition files and hands out their series one at a time.
pub trait ChannelVolumeProvider {
    fn open(&self, path: &Path) -> crate::error::Result<Box<dyn AcquisitionReader>>;
}

/// An opened acquisition.
///
/// Each series is handed out by value and at most once, so its samples are
/// freed as soon as the caller is done with it.
pub trait AcquisitionReader {
    fn series_count(&self) -> usize;
    fn read_series(&mut self, index: usize) -> crate::error::Result<SeriesImage>;
}

// ---------------------------------------------------------------------------
// In-memory acquisition
// ---------------------------------------------------------------------------

/// Series already decoded into memory, released as they are read.
pub struct InMemoryAcquisition {
    path: PathBuf,
    series: Vec<Option<SeriesImage>>,
}

impl InMemoryAcquisition {
    pub fn new(path: impl Into<PathBuf>, series: Vec<SeriesImage>) -> Self {
        Self {
            path: path.into(),
            series: series.into_iter().map(Some).collect(),
        }
    }
}

impl AcquisitionReader for InMemoryAcquisition {
    fn series_count(&self) -> usize {
        self.series.len()
    }

    fn read_series(&mut self, index: usize) -> crate::error::Result<SeriesImage> {
        let metadata_error = |reason: String| PipelineError::SeriesMetadata {
            path: self.path.clone(),
            reason,
        };
        let series = self
            .series
            .get_mut(index)
            .ok_or_else(|| metadata_error(format!("no series {index}")))?
            .take()
            .ok_or_else(|| metadata_error(format!("series {index} was already read")))?;
        series
            .validate()
            .map_err(|e| metadata_error(format!("{e:#}")))?;
        Ok(series)
    }
}

// ---------------------------------------------------------------------------
// File-backed provider
// ---------------------------------------------------------------------------

/// Reads acquisitions from disk, dispatching by extension.
///
/// Supported formats:
/// * `.parquet` / `.pq` – one row per series × channel, decoded one series at
///   a time (see [`ParquetAcquisition`])
/// * `.json`            – an [`AcquisitionDocument`], decoded whole
#[derive(Debug, Default, Clone, Copy)]
pub struct FileVolumeProvider;

impl ChannelVolumeProvider for FileVolumeProvider {
    fn open(&self, path: &Path) -> crate::error::Result<Box<dyn AcquisitionReader>> {
        let reader: Result<Box<dyn AcquisitionReader>> = match extension_of(path).as_str() {
            "parquet" | "pq" => ParquetAcquisition::open(path)
                .map(|acquisition| Box::new(acquisition) as Box<dyn AcquisitionReader>),
            "json" => load_json(path).map(|series| {
                Box::new(InMemoryAcquisition::new(path, series)) as Box<dyn AcquisitionReader>
            }),
            other => Err(anyhow!("Unsupported acquisition extension: .{other}")),
        };
        reader.map_err(|e| PipelineError::SeriesMetadata {
            path: path.to_path_buf(),
            reason: format!("{e:#}"),
        })
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Decode every series of an acquisition file.
pub fn load_file(path: &Path) -> Result<Vec<SeriesImage>> {
    match extension_of(path).as_str() {
        "parquet" | "pq" => load_parquet(path),
        "json" => load_json(path),
        other => bail!("Unsupported acquisition extension: .{other}"),
    }
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// JSON acquisition layout:
///
/// ```json
/// {
///   "series": [
///     {
///       "name": "Position 1",
///       "calibration": { "voxel_width": 0.1, "voxel_height": 0.1, "voxel_depth": 0.3, "unit": "micron" },
///       "geometry": { "width": 64, "height": 64, "slices": 12, "channels": 3, "frames": 1 },
///       "channels": [[...], [...], [...]]
///     }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionDocument {
    pub series: Vec<SeriesDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesDocument {
    pub name: String,
    pub calibration: Calibration,
    pub geometry: SeriesGeometry,
    pub channels: Vec<Vec<f32>>,
}

impl From<SeriesDocument> for SeriesImage {
    fn from(doc: SeriesDocument) -> Self {
        SeriesImage {
            name: doc.name,
            calibration: doc.calibration,
            geometry: doc.geometry,
            stacks: doc.channels,
        }
    }
}

fn load_json(path: &Path) -> Result<Vec<SeriesImage>> {
    let text = std::fs::read_to_string(path).context("reading JSON acquisition")?;
    let doc: AcquisitionDocument =
        serde_json::from_str(&text).context("parsing JSON acquisition")?;
    Ok(doc.series.into_iter().map(SeriesImage::from).collect())
}

// ---------------------------------------------------------------------------
// Parquet acquisition
// ---------------------------------------------------------------------------

/// Per-series fields gathered while walking the rows.
struct PendingSeries {
    name: String,
    calibration: Calibration,
    width: usize,
    height: usize,
    slices: usize,
    frames: usize,
    channels: BTreeMap<usize, Vec<f32>>,
}

impl PendingSeries {
    fn into_series(self, index: usize) -> Result<SeriesImage> {
        let n_channels = self.channels.len();
        let mut stacks = Vec::with_capacity(n_channels);
        for (expected_channel, (channel, data)) in self.channels.into_iter().enumerate() {
            if channel != expected_channel + 1 {
                bail!(
                    "series {index}: channels must be contiguous from 1, missing {}",
                    expected_channel + 1
                );
            }
            stacks.push(data);
        }
        Ok(SeriesImage {
            name: self.name,
            calibration: self.calibration,
            geometry: SeriesGeometry {
                width: self.width,
                height: self.height,
                slices: self.slices,
                channels: n_channels,
                frames: self.frames,
            },
            stacks,
        })
    }
}

/// A Parquet acquisition opened for per-series reads.
///
/// Expected schema, one row per series × channel:
/// - `series`: Int64 – 0-based series index
/// - `name`: Utf8
/// - `channel`: Int64 – 1-based channel index
/// - `width`, `height`, `slices`, `frames`: Int64
/// - `voxel_width`, `voxel_height`, `voxel_depth`: Float64
/// - `unit`: Utf8
/// - `data`: List<Float32> or List<Float64> – frame-major, then z, y, x
///
/// Opening reads only the `series` column. Each series is decoded on request
/// through a row selection, so at most one series is held in memory.
pub struct ParquetAcquisition {
    path: PathBuf,
    total_rows: usize,
    /// Row ranges of each series, indexed by series.
    rows: Vec<Vec<Range<usize>>>,
    taken: Vec<bool>,
}

fn reader_builder(path: &Path) -> Result<ParquetRecordBatchReaderBuilder<File>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")
}

impl ParquetAcquisition {
    pub fn open(path: &Path) -> Result<Self> {
        let builder = reader_builder(path)?;
        let total_rows = usize::try_from(builder.metadata().file_metadata().num_rows())
            .context("negative row count")?;
        let mask = ProjectionMask::columns(builder.parquet_schema(), ["series"]);
        let reader = builder
            .with_projection(mask)
            .build()
            .context("building parquet reader")?;

        let mut rows: BTreeMap<usize, Vec<Range<usize>>> = BTreeMap::new();
        let mut offset = 0;
        for batch_result in reader {
            let batch = batch_result.context("reading series column")?;
            for row in 0..batch.num_rows() {
                let at = offset + row;
                let index = usize_at(&batch, "series", row).with_context(|| format!("row {at}"))?;
                let ranges = rows.entry(index).or_default();
                match ranges.last_mut() {
                    Some(last) if last.end == at => last.end += 1,
                    _ => ranges.push(at..at + 1),
                }
            }
            offset += batch.num_rows();
        }

        for (expected, index) in rows.keys().enumerate() {
            if *index != expected {
                bail!("series indices must be contiguous from 0, missing {expected}");
            }
        }
        let rows: Vec<Vec<Range<usize>>> = rows.into_values().collect();
        Ok(Self {
            path: path.to_path_buf(),
            total_rows,
            taken: vec![false; rows.len()],
            rows,
        })
    }

    /// Decode the rows of one series.
    fn decode(&self, index: usize) -> Result<SeriesImage> {
        let ranges = self
            .rows
            .get(index)
            .with_context(|| format!("no series {index}"))?;
        let selection = RowSelection::from_consecutive_ranges(ranges.iter().cloned(), self.total_rows);
        let reader = reader_builder(&self.path)?
            .with_row_selection(selection)
            .build()
            .context("building parquet reader")?;

        let mut pending: BTreeMap<usize, PendingSeries> = BTreeMap::new();
        for batch_result in reader {
            let batch = batch_result.context("reading parquet record batch")?;
            for row in 0..batch.num_rows() {
                read_row(&batch, row, &mut pending)
                    .with_context(|| format!("series {index}, row {row}"))?;
            }
        }
        match pending.remove(&index) {
            Some(series) if pending.is_empty() => series.into_series(index),
            _ => bail!("rows selected for series {index} belong to another series"),
        }
    }
}

impl AcquisitionReader for ParquetAcquisition {
    fn series_count(&self) -> usize {
        self.rows.len()
    }

    fn read_series(&mut self, index: usize) -> crate::error::Result<SeriesImage> {
        let metadata_error = |reason: String| PipelineError::SeriesMetadata {
            path: self.path.clone(),
            reason,
        };
        match self.taken.get(index) {
            None => return Err(metadata_error(format!("no series {index}"))),
            Some(true) => return Err(metadata_error(format!("series {index} was already read"))),
            Some(false) => {}
        }
        self.taken[index] = true;

        let series = self
            .decode(index)
            .and_then(|series| {
                series.validate()?;
                Ok(series)
            })
            .map_err(|e| metadata_error(format!("{e:#}")))?;
        Ok(series)
    }
}

/// Decode every series of a Parquet acquisition.
pub fn load_parquet(path: &Path) -> Result<Vec<SeriesImage>> {
    let acquisition = ParquetAcquisition::open(path)?;
    (0..acquisition.series_count())
        .map(|index| acquisition.decode(index))
        .collect()
}

fn read_row(
    batch: &RecordBatch,
    row: usize,
    pending: &mut BTreeMap<usize, PendingSeries>,
) -> Result<()> {
    let index = usize_at(batch, "series", row)?;
    let channel = usize_at(batch, "channel", row)?;
    let width = usize_at(batch, "width", row)?;
    let height = usize_at(batch, "height", row)?;
    let slices = usize_at(batch, "slices", row)?;
    let frames = usize_at(batch, "frames", row)?;
    let calibration = Calibration {
        voxel_width: f64_at(batch, "voxel_width", row)?,
        voxel_height: f64_at(batch, "voxel_height", row)?,
        voxel_depth: f64_at(batch, "voxel_depth", row)?,
        unit: string_at(batch, "unit", row)?,
    };
    let name = string_at(batch, "name", row)?;
    let data = extract_f32_list(column(batch, "data")?, row).context("reading 'data'")?;

    let entry = pending.entry(index).or_insert_with(|| PendingSeries {
        name: name.clone(),
        calibration: calibration.clone(),
        width,
        height,
        slices,
        frames,
        channels: BTreeMap::new(),
    });
    if (entry.width, entry.height, entry.slices, entry.frames) != (width, height, slices, frames)
        || entry.calibration != calibration
    {
        bail!("series {index}: channel {channel} disagrees on geometry or calibration");
    }
    if entry.channels.insert(channel, data).is_some() {
        bail!("series {index}: channel {channel} appears twice");
    }
    Ok(())
}

/// Schema of a Parquet acquisition, see [`ParquetAcquisition`].
fn acquisition_schema() -> Arc<Schema> {
    let int = |name: &str| Field::new(name, DataType::Int64, false);
    let float = |name: &str| Field::new(name, DataType::Float64, false);
    Arc::new(Schema::new(vec![
        int("series"),
        Field::new("name", DataType::Utf8, false),
        int("channel"),
        int("width"),
        int("height"),
        int("slices"),
        int("frames"),
        float("voxel_width"),
        float("voxel_height"),
        float("voxel_depth"),
        Field::new("unit", DataType::Utf8, false),
        Field::new(
            "data",
            DataType::List(Arc::new(Field::new("item", DataType::Float32, true))),
            false,
        ),
    ]))
}

/// One row per channel of `image`, tagged with series `index`.
fn series_batch(index: usize, image: &SeriesImage) -> Result<RecordBatch> {
    let g = &image.geometry;
    let cal = &image.calibration;
    let n = image.stacks.len();
    let int = |v: usize| -> ArrayRef { Arc::new(Int64Array::from(vec![v as i64; n])) };
    let float = |v: f64| -> ArrayRef { Arc::new(Float64Array::from(vec![v; n])) };
    let text = |v: &str| -> ArrayRef { Arc::new(StringArray::from(vec![v; n])) };

    let mut data = ListBuilder::new(Float32Builder::new());
    for stack in &image.stacks {
        data.values().append_slice(stack);
        data.append(true);
    }

    RecordBatch::try_new(
        acquisition_schema(),
        vec![
            int(index),
            text(&image.name),
            Arc::new(Int64Array::from_iter_values(1..=n as i64)),
            int(g.width),
            int(g.height),
            int(g.slices),
            int(g.frames),
            float(cal.voxel_width),
            float(cal.voxel_height),
            float(cal.voxel_depth),
            text(&cal.unit),
            Arc::new(data.finish()),
        ],
    )
    .with_context(|| format!("assembling series {index}"))
}

/// Write series in the layout [`ParquetAcquisition`] reads, one row group
/// per series.
pub fn write_parquet(path: &Path, series: &[SeriesImage]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, acquisition_schema(), None)
        .context("creating parquet writer")?;
    for (index, image) in series.iter().enumerate() {
        writer
            .write(&series_batch(index, image)?)
            .with_context(|| format!("writing series {index}"))?;
        writer.flush().context("closing row group")?;
    }
    writer.close().context("closing parquet writer")?;
    Ok(())
}

// -- Parquet / Arrow helpers --

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Arc<dyn Array>> {
    let idx = batch
        .schema()
        .index_of(name)
        .map_err(|_| anyhow::anyhow!("Parquet file missing '{name}' column"))?;
    Ok(batch.column(idx))
}

fn usize_at(batch: &RecordBatch, name: &str, row: usize) -> Result<usize> {
    let col = column(batch, name)?;
    if col.is_null(row) {
        bail!("null '{name}'");
    }
    let value = match col.data_type() {
        DataType::Int64 => col
            .as_any()
            .downcast_ref::<Int64Array>()
            .context("expected Int64Array")?
            .value(row),
        DataType::Int32 => col
            .as_any()
            .downcast_ref::<Int32Array>()
            .context("expected Int32Array")?
            .value(row) as i64,
        other => bail!("column '{name}' is {other:?}, expected an integer"),
    };
    usize::try_from(value).with_context(|| format!("negative '{name}': {value}"))
}

fn f64_at(batch: &RecordBatch, name: &str, row: usize) -> Result<f64> {
    let col = column(batch, name)?;
    if col.is_null(row) {
        bail!("null '{name}'");
    }
    match col.data_type() {
        DataType::Float64 => Ok(col
            .as_any()
            .downcast_ref::<Float64Array>()
            .context("expected Float64Array")?
            .value(row)),
        DataType::Float32 => Ok(col
            .as_any()
            .downcast_ref::<Float32Array>()
            .context("expected Float32Array")?
            .value(row) as f64),
        other => bail!("column '{name}' is {other:?}, expected a float"),
    }
}

fn string_at(batch: &RecordBatch, name: &str, row: usize) -> Result<String> {
    let col = column(batch, name)?;
    if col.is_null(row) {
        return Ok(String::new());
    }
    match col.data_type() {
        DataType::Utf8 => Ok(col
            .as_any()
            .downcast_ref::<StringArray>()
            .context("expected StringArray")?
            .value(row)
            .to_string()),
        DataType::LargeUtf8 => Ok(col.as_string::<i64>().value(row).to_string()),
        other => bail!("column '{name}' is {other:?}, expected text"),
    }
}

/// Extract a `Vec<f32>` from a List or LargeList column at the given row.
fn extract_f32_list(col: &Arc<dyn Array>, row: usize) -> Result<Vec<f32>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => col
            .as_any()
            .downcast_ref::<ListArray>()
            .context("expected ListArray")?
            .value(row),
        DataType::LargeList(_) => col
            .as_any()
            .downcast_ref::<LargeListArray>()
            .context("expected LargeListArray")?
            .value(row),
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        Ok(f32_arr.iter().map(|v| v.unwrap_or(f32::NAN)).collect())
    } else if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        Ok(f64_arr
            .iter()
            .map(|v| v.unwrap_or(f64::NAN) as f32)
            .collect())
    } else {
        bail!(
            "List inner type is {:?}, expected Float32 or Float64",
            values_array.data_type()
        )
    }
}
