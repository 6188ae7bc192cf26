use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::BorderPolicy;
use crate::data::volume::{Calibration, Dims, LabeledVolume};
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Geometry helpers
// ---------------------------------------------------------------------------

/// Inclusive voxel bounds of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub min: [usize; 3],
    pub max: [usize; 3],
}

impl BoundingBox {
    fn point(p: [usize; 3]) -> Self {
        Self { min: p, max: p }
    }

    fn include(&mut self, p: [usize; 3]) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(p[axis]);
            self.max[axis] = self.max[axis].max(p[axis]);
        }
    }
}

/// Which axes have at least one member voxel on their first or last plane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BorderContact {
    pub x: bool,
    pub y: bool,
    pub z: bool,
}

impl BorderContact {
    fn of(bounds: &BoundingBox, dims: Dims) -> Self {
        let extent = [dims.width, dims.height, dims.depth];
        let on = |a: usize| bounds.min[a] == 0 || bounds.max[a] + 1 == extent[a];
        Self {
            x: on(0),
            y: on(1),
            z: on(2),
        }
    }
}

impl BorderPolicy {
    /// Whether `object` touches a face this policy checks.
    pub fn rejects(&self, object: &Object3D) -> bool {
        let c = object.contact;
        (self.x && c.x) || (self.y && c.y) || (self.z && c.z)
    }
}

// ---------------------------------------------------------------------------
// Object3D
// ---------------------------------------------------------------------------

/// One candidate object: every voxel carrying `label` in the labeled volume.
///
/// Membership is not copied; it is read back from the owning population's
/// labels within `bounds`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Object3D {
    label: u32,
    name: Option<String>,
    voxel_count: usize,
    volume: f64,
    bounds: BoundingBox,
    contact: BorderContact,
    centroid: [f64; 3],
}

impl Object3D {
    /// Label in the segmentation output.
    pub fn label(&self) -> u32 {
        self.label
    }

    /// Assigned once the object survives filtering.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn voxel_count(&self) -> usize {
        self.voxel_count
    }

    /// Physical volume in calibrated unit³.
    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    pub fn contact(&self) -> BorderContact {
        self.contact
    }

    /// Mean voxel position, in voxel coordinates.
    pub fn centroid(&self) -> [f64; 3] {
        self.centroid
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }
}

// ---------------------------------------------------------------------------
// ObjectPopulation
// ---------------------------------------------------------------------------

/// All objects of one labeled volume, in ascending label order.
#[derive(Debug, Clone)]
pub struct ObjectPopulation {
    labels: LabeledVolume,
    objects: Vec<Object3D>,
}

struct Accumulator {
    count: usize,
    bounds: BoundingBox,
    sum: [f64; 3],
}

impl ObjectPopulation {
    /// Turn a labeled volume into one object per distinct positive label.
    ///
    /// `calibration` replaces whatever the segmentation output carried.
    pub fn build(labels: LabeledVolume, calibration: &Calibration) -> Result<Self> {
        let labels = labels.with_calibration(calibration.clone());
        let dims = labels.dims();

        let mut acc: BTreeMap<u32, Accumulator> = BTreeMap::new();
        for (index, &label) in labels.data().iter().enumerate() {
            if label == 0 {
                continue;
            }
            let p = dims.coords(index);
            let entry = acc.entry(label).or_insert_with(|| Accumulator {
                count: 0,
                bounds: BoundingBox::point(p),
                sum: [0.0; 3],
            });
            entry.count += 1;
            entry.bounds.include(p);
            for axis in 0..3 {
                entry.sum[axis] += p[axis] as f64;
            }
        }

        if acc.is_empty() {
            return Err(PipelineError::SegmentationEmpty);
        }

        let voxel_volume = calibration.voxel_volume();
        let objects = acc
            .into_iter()
            .map(|(label, a)| {
                let n = a.count as f64;
                Object3D {
                    label,
                    name: None,
                    voxel_count: a.count,
                    volume: n * voxel_volume,
                    contact: BorderContact::of(&a.bounds, dims),
                    bounds: a.bounds,
                    centroid: [a.sum[0] / n, a.sum[1] / n, a.sum[2] / n],
                }
            })
            .collect();

        Ok(Self { labels, objects })
    }

    pub fn objects(&self) -> &[Object3D] {
        &self.objects
    }

    pub fn labels(&self) -> &LabeledVolume {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub(crate) fn into_parts(self) -> (LabeledVolume, Vec<Object3D>) {
        (self.labels, self.objects)
    }
}

/// Linear indices of `object`'s voxels in `labels`, in storage order.
pub fn member_indices<'a>(
    labels: &'a LabeledVolume,
    object: &'a Object3D,
) -> impl Iterator<Item = usize> + 'a {
    let dims = labels.dims();
    let b = object.bounds;
    (b.min[2]..=b.max[2]).flat_map(move |z| {
        (b.min[1]..=b.max[1]).flat_map(move |y| {
            (b.min[0]..=b.max[0])
                .map(move |x| dims.index(x, y, z))
                .filter(move |&i| labels.data()[i] == object.label)
        })
    })
}
