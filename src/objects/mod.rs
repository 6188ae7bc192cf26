/// Object layer: labeled volume → objects → survivors → statistics.
///
/// ```text
///   LabeledVolume
///        │  ObjectPopulation::build
///        ▼
///   ObjectPopulation      one Object3D per positive label
///        │  filter(rules)
///        ▼
///   FilteredPopulation    survivors named prefix+1, prefix+2, ...
///        │  measure_population(channel_a, channel_b)
///        ▼
///   MeasuredPopulation    mean / median per object and channel
/// ```

pub mod filter;
pub mod population;
pub mod stats;

pub use filter::{filter, FilterRules, FilterSummary, FilteredPopulation, Rejection};
pub use population::{BorderContact, BoundingBox, Object3D, ObjectPopulation};
pub use stats::{measure, measure_population, IntensityStats, MeasuredPopulation, ObjectMeasurement};
