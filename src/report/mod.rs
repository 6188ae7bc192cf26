//! Run output: the measurement table and per-series object archives.

pub mod store;
pub mod table;

pub use store::{ParquetPopulationStore, PopulationStore};
pub use table::{MeasurementRecord, ResultAggregator, ResultTable};
