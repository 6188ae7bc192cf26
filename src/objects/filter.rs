use std::collections::HashSet;

use log::debug;

use super::population::{Object3D, ObjectPopulation};
use crate::config::BorderPolicy;
use crate::data::volume::LabeledVolume;

// ---------------------------------------------------------------------------
// Admissibility rules
// ---------------------------------------------------------------------------

/// Rules an object must pass to be measured.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterRules {
    /// Minimum physical volume (unit³). Zero or negative never rejects.
    pub min_volume: f64,
    pub border: BorderPolicy,
    /// Survivors are named `prefix + N`, N counting from 1.
    pub prefix: String,
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            min_volume: 0.1,
            border: BorderPolicy::default(),
            prefix: "Bact_".to_string(),
        }
    }
}

/// Why an object was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    TooSmall,
    TouchesBorder,
}

impl FilterRules {
    /// First rule `object` fails, if any. Volume is checked before border.
    pub fn rejection(&self, object: &Object3D) -> Option<Rejection> {
        if object.volume() < self.min_volume {
            Some(Rejection::TooSmall)
        } else if self.border.rejects(object) {
            Some(Rejection::TouchesBorder)
        } else {
            None
        }
    }
}

/// Counts reported after filtering one population.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterSummary {
    pub candidates: usize,
    pub too_small: usize,
    pub touching_border: usize,
    pub kept: usize,
}

// ---------------------------------------------------------------------------
// FilteredPopulation
// ---------------------------------------------------------------------------

/// Objects that passed every rule, named and renumbered from 1.
///
/// Labels of rejected objects are cleared to background, so the labeled
/// volume only describes survivors. Intensity statistics can only be taken
/// from this type.
#[derive(Debug, Clone)]
pub struct FilteredPopulation {
    labels: LabeledVolume,
    objects: Vec<Object3D>,
    summary: FilterSummary,
}

impl FilteredPopulation {
    pub fn objects(&self) -> &[Object3D] {
        &self.objects
    }

    pub fn labels(&self) -> &LabeledVolume {
        &self.labels
    }

    pub fn summary(&self) -> FilterSummary {
        self.summary
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Drop inadmissible objects and name the survivors in label order.
pub fn filter(population: ObjectPopulation, rules: &FilterRules) -> FilteredPopulation {
    let (mut labels, objects) = population.into_parts();
    let mut summary = FilterSummary {
        candidates: objects.len(),
        ..FilterSummary::default()
    };

    let mut survivors = Vec::with_capacity(objects.len());
    let mut rejected: HashSet<u32> = HashSet::new();
    for mut object in objects {
        match rules.rejection(&object) {
            Some(reason) => {
                debug!(
                    "rejecting label {} ({:?}, volume {:.4})",
                    object.label(),
                    reason,
                    object.volume()
                );
                match reason {
                    Rejection::TooSmall => summary.too_small += 1,
                    Rejection::TouchesBorder => summary.touching_border += 1,
                }
                rejected.insert(object.label());
            }
            None => {
                object.set_name(format!("{}{}", rules.prefix, survivors.len() + 1));
                survivors.push(object);
            }
        }
    }
    summary.kept = survivors.len();

    if !rejected.is_empty() {
        for label in labels.data_mut() {
            if rejected.contains(label) {
                *label = 0;
            }
        }
    }

    FilteredPopulation {
        labels,
        objects: survivors,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::volume::{Calibration, Dims};

    /// 10x10x4 volume: label 1 is a 2x2x2 block inside, label 2 a single
    /// interior voxel, label 3 a block on the x=0 face, label 4 spans all of z.
    fn labels() -> LabeledVolume {
        LabeledVolume::from_fn(Dims::new(10, 10, 4), Calibration::default(), |x, y, z| {
            match (x, y, z) {
                (2..=3, 2..=3, 1..=2) => 1,
                (6, 6, 1) => 2,
                (0..=1, 6..=7, 1..=2) => 3,
                (7..=8, 2..=3, _) => 4,
                _ => 0,
            }
        })
    }

    fn population() -> ObjectPopulation {
        ObjectPopulation::build(labels(), &Calibration::default()).unwrap()
    }

    fn names(filtered: &FilteredPopulation) -> Vec<(u32, String)> {
        filtered
            .objects()
            .iter()
            .map(|o| (o.label(), o.name().unwrap_or_default().to_string()))
            .collect()
    }

    #[test]
    fn survivors_are_renumbered_in_label_order() {
        let rules = FilterRules {
            min_volume: 2.0,
            ..FilterRules::default()
        };
        let filtered = filter(population(), &rules);
        assert_eq!(
            names(&filtered),
            vec![(1, "Bact_1".to_string()), (4, "Bact_2".to_string())]
        );
        assert_eq!(
            filtered.summary(),
            FilterSummary {
                candidates: 4,
                too_small: 1,
                touching_border: 1,
                kept: 2
            }
        );
    }

    #[test]
    fn rejected_labels_are_cleared() {
        let rules = FilterRules {
            min_volume: 2.0,
            ..FilterRules::default()
        };
        let filtered = filter(population(), &rules);
        let data = filtered.labels().data();
        assert!(!data.contains(&2));
        assert!(!data.contains(&3));
        assert!(data.contains(&1) && data.contains(&4));
    }

    #[test]
    fn non_positive_min_volume_never_rejects_by_size() {
        let rules = FilterRules {
            min_volume: -1.0,
            border: BorderPolicy::disabled(),
            ..FilterRules::default()
        };
        assert_eq!(filter(population(), &rules).len(), 4);
    }

    #[test]
    fn depth_spanning_object_survives_when_depth_is_exempt() {
        let rules = FilterRules {
            min_volume: 0.0,
            ..FilterRules::default()
        };
        let kept: Vec<u32> = filter(population(), &rules)
            .objects()
            .iter()
            .map(|o| o.label())
            .collect();
        assert!(kept.contains(&4));
        assert!(!kept.contains(&3));

        let strict = FilterRules {
            min_volume: 0.0,
            border: BorderPolicy::all_axes(),
            ..FilterRules::default()
        };
        let kept: Vec<u32> = filter(population(), &strict)
            .objects()
            .iter()
            .map(|o| o.label())
            .collect();
        assert_eq!(kept, vec![1, 2]);
    }

    #[test]
    fn border_rejects_regardless_of_volume() {
        let rules = FilterRules {
            min_volume: 0.0,
            ..FilterRules::default()
        };
        let pop = population();
        let big_edge = &pop.objects()[2];
        assert_eq!(big_edge.label(), 3);
        assert_eq!(rules.rejection(big_edge), Some(Rejection::TouchesBorder));
    }

    #[test]
    fn custom_prefix_is_used() {
        let rules = FilterRules {
            min_volume: 0.0,
            border: BorderPolicy::disabled(),
            prefix: "Cell-".to_string(),
        };
        let filtered = filter(population(), &rules);
        assert_eq!(filtered.objects()[3].name(), Some("Cell-4"));
    }
}
