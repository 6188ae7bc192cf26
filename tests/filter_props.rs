use std::collections::BTreeSet;

use bact_measure::config::BorderPolicy;
use bact_measure::data::volume::{Calibration, Dims, LabeledVolume};
use bact_measure::objects::{filter, FilterRules, ObjectPopulation};
use bact_measure::PipelineError;
use proptest::prelude::*;

const DIMS: Dims = Dims {
    width: 6,
    height: 5,
    depth: 3,
};

fn labels_strategy() -> impl Strategy<Value = Vec<u32>> {
    // Mostly background with up to five labels.
    prop::collection::vec(
        prop_oneof![3 => Just(0u32), 2 => 1u32..=5],
        DIMS.width * DIMS.height * DIMS.depth,
    )
}

fn policy_strategy() -> impl Strategy<Value = BorderPolicy> {
    (any::<bool>(), any::<bool>(), any::<bool>()).prop_map(|(x, y, z)| BorderPolicy { x, y, z })
}

fn population(data: Vec<u32>) -> Option<ObjectPopulation> {
    let labels = LabeledVolume::new(DIMS, Calibration::default(), data).unwrap();
    match ObjectPopulation::build(labels, &Calibration::default()) {
        Ok(pop) => Some(pop),
        Err(PipelineError::SegmentationEmpty) => None,
        Err(e) => panic!("unexpected error {e}"),
    }
}

fn kept_labels(data: &[u32], rules: &FilterRules) -> BTreeSet<u32> {
    population(data.to_vec())
        .map(|pop| filter(pop, rules).objects().iter().map(|o| o.label()).collect())
        .unwrap_or_default()
}

proptest! {
    #[test]
    fn survivors_satisfy_every_rule(
        data in labels_strategy(),
        min_volume in -2.0f64..20.0,
        border in policy_strategy(),
    ) {
        let Some(pop) = population(data) else { return Ok(()); };
        let candidates = pop.len();
        let rules = FilterRules { min_volume, border, ..FilterRules::default() };
        let filtered = filter(pop, &rules);

        let summary = filtered.summary();
        prop_assert_eq!(summary.candidates, candidates);
        prop_assert_eq!(summary.kept + summary.too_small + summary.touching_border, candidates);

        let mut previous = 0;
        for (i, object) in filtered.objects().iter().enumerate() {
            prop_assert!(object.volume() >= min_volume || min_volume <= 0.0);
            prop_assert!(!border.rejects(object));
            prop_assert!(object.label() > previous);
            previous = object.label();
            let expected = format!("Bact_{}", i + 1);
            prop_assert_eq!(object.name(), Some(expected.as_str()));
        }

        let kept: BTreeSet<u32> = filtered.objects().iter().map(|o| o.label()).collect();
        for &label in filtered.labels().data() {
            prop_assert!(label == 0 || kept.contains(&label));
        }
    }

    #[test]
    fn raising_min_volume_never_adds_survivors(
        data in labels_strategy(),
        low in 0.0f64..10.0,
        step in 0.0f64..10.0,
        border in policy_strategy(),
    ) {
        let loose = FilterRules { min_volume: low, border, ..FilterRules::default() };
        let strict = FilterRules { min_volume: low + step, border, ..FilterRules::default() };
        let loose_kept = kept_labels(&data, &loose);
        let strict_kept = kept_labels(&data, &strict);
        prop_assert!(strict_kept.is_subset(&loose_kept));
    }

    #[test]
    fn filtering_is_deterministic(data in labels_strategy(), border in policy_strategy()) {
        let rules = FilterRules { min_volume: 3.0, border, ..FilterRules::default() };
        let (Some(a), Some(b)) = (population(data.clone()), population(data)) else {
            return Ok(());
        };
        let a = filter(a, &rules);
        let b = filter(b, &rules);
        prop_assert_eq!(a.objects(), b.objects());
        prop_assert_eq!(a.labels().data(), b.labels().data());
    }
}
