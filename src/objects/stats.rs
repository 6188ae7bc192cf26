use log::warn;
use serde::Serialize;

use super::filter::FilteredPopulation;
use super::population::{member_indices, Object3D};
use crate::data::volume::Volume;
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Intensity statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IntensityStats {
    pub mean: f64,
    /// Average of the two middle values when the count is even.
    pub median: f64,
}

/// Mean and median of `values`, reordering them in place.
pub fn summarize(values: &mut [f32]) -> Option<IntensityStats> {
    if values.is_empty() {
        return None;
    }
    let n = values.len();
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n as f64;

    values.sort_unstable_by(|a, b| a.total_cmp(b));
    let mid = n / 2;
    let median = if n % 2 == 1 {
        values[mid] as f64
    } else {
        (values[mid - 1] as f64 + values[mid] as f64) / 2.0
    };
    Some(IntensityStats { mean, median })
}

/// Statistics of `channel` over the voxels of one surviving object.
pub fn measure(
    population: &FilteredPopulation,
    object: &Object3D,
    channel: &Volume,
) -> Result<IntensityStats> {
    let labels = population.labels();
    if channel.dims() != labels.dims() {
        return Err(PipelineError::ShapeMismatch {
            expected: labels.dims(),
            found: channel.dims(),
        });
    }
    let samples = channel.data();
    let mut values: Vec<f32> = member_indices(labels, object).map(|i| samples[i]).collect();
    summarize(&mut values).ok_or(PipelineError::EmptyMembership {
        label: object.label(),
    })
}

// ---------------------------------------------------------------------------
// Population-wide measurement
// ---------------------------------------------------------------------------

/// Both channels' statistics for one named object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectMeasurement {
    pub label: u32,
    pub name: String,
    pub channel_a: IntensityStats,
    pub channel_b: IntensityStats,
}

/// A filtered population together with its measurements, in object order.
#[derive(Debug, Clone)]
pub struct MeasuredPopulation {
    population: FilteredPopulation,
    measurements: Vec<ObjectMeasurement>,
}

impl MeasuredPopulation {
    pub fn population(&self) -> &FilteredPopulation {
        &self.population
    }

    pub fn measurements(&self) -> &[ObjectMeasurement] {
        &self.measurements
    }
}

/// Measure every survivor in both channels.
///
/// An object without member voxels is logged and left out; a channel whose
/// shape differs from the labels fails the whole population.
pub fn measure_population(
    population: FilteredPopulation,
    channel_a: &Volume,
    channel_b: &Volume,
) -> Result<MeasuredPopulation> {
    let expected = population.labels().dims();
    for channel in [channel_a, channel_b] {
        if channel.dims() != expected {
            return Err(PipelineError::ShapeMismatch {
                expected,
                found: channel.dims(),
            });
        }
    }

    let mut measurements = Vec::with_capacity(population.len());
    for object in population.objects() {
        let stats = measure(&population, object, channel_a)
            .and_then(|a| Ok((a, measure(&population, object, channel_b)?)));
        match stats {
            Ok((a, b)) => measurements.push(ObjectMeasurement {
                label: object.label(),
                name: object.name().unwrap_or_default().to_string(),
                channel_a: a,
                channel_b: b,
            }),
            Err(e) => warn!("skipping object {}: {e}", object.label()),
        }
    }

    Ok(MeasuredPopulation {
        population,
        measurements,
    })
}
