use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array, Int64Array, Int64Builder, ListBuilder, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use crate::error::PipelineError;
use crate::objects::population::member_indices;
use crate::objects::FilteredPopulation;

// ---------------------------------------------------------------------------
// PopulationStore – where filtered geometry goes
// ---------------------------------------------------------------------------

/// Persists the surviving objects of one series.
pub trait PopulationStore {
    /// File extension of the archives, without the dot.
    fn extension(&self) -> &str;

    fn save(&mut self, population: &FilteredPopulation, path: &Path) -> crate::error::Result<()>;
}

impl<S: PopulationStore + ?Sized> PopulationStore for &mut S {
    fn extension(&self) -> &str {
        (**self).extension()
    }

    fn save(&mut self, population: &FilteredPopulation, path: &Path) -> crate::error::Result<()> {
        (**self).save(population, path)
    }
}

/// Writes one Parquet row per object, member voxels included.
///
/// Columns: `name`, `label`, `voxel_count`, `volume`, `unit`,
/// `centroid_{x,y,z}`, `min_{x,y,z}`, `max_{x,y,z}` and the voxel
/// coordinates as three `List<Int64>` columns `x`, `y`, `z`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParquetPopulationStore;

impl PopulationStore for ParquetPopulationStore {
    fn extension(&self) -> &str {
        "objects.parquet"
    }

    fn save(&mut self, population: &FilteredPopulation, path: &Path) -> crate::error::Result<()> {
        write_population(population, path).map_err(|e| PipelineError::Persistence {
            path: path.to_path_buf(),
            reason: format!("{e:#}"),
        })
    }
}

fn write_population(population: &FilteredPopulation, path: &Path) -> Result<()> {
    let labels = population.labels();
    let dims = labels.dims();
    let unit = labels.calibration().unit.as_str();
    let objects = population.objects();

    let mut coords = [
        ListBuilder::new(Int64Builder::new()),
        ListBuilder::new(Int64Builder::new()),
        ListBuilder::new(Int64Builder::new()),
    ];
    for object in objects {
        for index in member_indices(labels, object) {
            let p = dims.coords(index);
            for axis in 0..3 {
                coords[axis].values().append_value(p[axis] as i64);
            }
        }
        for builder in coords.iter_mut() {
            builder.append(true);
        }
    }

    let int_column = |f: &dyn Fn(usize) -> i64| -> ArrayRef {
        Arc::new(Int64Array::from_iter_values((0..objects.len()).map(f)))
    };
    let float_column = |f: &dyn Fn(usize) -> f64| -> ArrayRef {
        Arc::new(Float64Array::from_iter_values((0..objects.len()).map(f)))
    };

    let mut fields = vec![
        Field::new("name", DataType::Utf8, false),
        Field::new("label", DataType::Int64, false),
        Field::new("voxel_count", DataType::Int64, false),
        Field::new("volume", DataType::Float64, false),
        Field::new("unit", DataType::Utf8, false),
    ];
    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            objects.iter().map(|o| o.name().unwrap_or_default()),
        )),
        int_column(&|i| objects[i].label() as i64),
        int_column(&|i| objects[i].voxel_count() as i64),
        float_column(&|i| objects[i].volume()),
        Arc::new(StringArray::from_iter_values(objects.iter().map(|_| unit))),
    ];

    for (axis, name) in ["x", "y", "z"].iter().enumerate() {
        fields.push(Field::new(format!("centroid_{name}"), DataType::Float64, false));
        columns.push(float_column(&|i| objects[i].centroid()[axis]));
    }
    for (axis, name) in ["x", "y", "z"].iter().enumerate() {
        fields.push(Field::new(format!("min_{name}"), DataType::Int64, false));
        columns.push(int_column(&|i| objects[i].bounds().min[axis] as i64));
        fields.push(Field::new(format!("max_{name}"), DataType::Int64, false));
        columns.push(int_column(&|i| objects[i].bounds().max[axis] as i64));
    }
    for (builder, name) in coords.iter_mut().zip(["x", "y", "z"]) {
        fields.push(Field::new(
            name,
            DataType::List(Arc::new(Field::new("item", DataType::Int64, true))),
            false,
        ));
        columns.push(Arc::new(builder.finish()));
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), columns).context("assembling population batch")?;

    let file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing population batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BorderPolicy;
    use crate::data::volume::{Calibration, Dims, LabeledVolume};
    use crate::objects::{filter, FilterRules, ObjectPopulation};
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::Int64Type;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    #[test]
    fn archive_holds_one_row_per_survivor() {
        let labels = LabeledVolume::from_fn(Dims::new(5, 5, 1), Calibration::default(), |x, y, _| {
            match (x, y) {
                (1, 1) | (2, 1) => 4,
                (3, 3) => 9,
                _ => 0,
            }
        });
        let pop = ObjectPopulation::build(labels, &Calibration::default()).unwrap();
        let rules = FilterRules {
            min_volume: 0.0,
            border: BorderPolicy::disabled(),
            ..FilterRules::default()
        };
        let filtered = filter(pop, &rules);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pop.parquet");
        ParquetPopulationStore.save(&filtered, &path).unwrap();

        let file = std::fs::File::open(&path).unwrap();
        let batch = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(batch.num_rows(), 2);

        let names = batch.column_by_name("name").unwrap().as_string::<i32>();
        assert_eq!(names.value(0), "Bact_1");
        assert_eq!(names.value(1), "Bact_2");

        let xs = batch.column_by_name("x").unwrap().as_list::<i32>();
        let first = xs.value(0);
        let first = first.as_primitive::<Int64Type>();
        assert_eq!(first.len(), 2);
        assert_eq!(first.values().to_vec(), vec![1, 2]);
    }
}
