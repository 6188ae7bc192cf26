/// Data layer: calibrated volumes and acquisition loading.
///
/// Architecture:
/// ```text
///  .parquet / .json
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → AcquisitionReader
///   └──────────┘
///        │  read_series (by value, once)
///        ▼
///   ┌─────────────┐
///   │ SeriesImage  │  calibration, geometry, one stack per channel
///   └─────────────┘
///        │  channels(layout, frame)
///        ▼
///   ┌────────────────┐
///   │ SeriesChannels  │  structural + two measurement Volumes
///   └────────────────┘
/// ```

pub mod loader;
pub mod model;
pub mod preprocess;
pub mod volume;
