// ============================================================
// Layer 4 — Label Balancer
// ============================================================
// Sentiment corpora are usually skewed (hotel reviews are mostly
// positive). Training on a skewed split teaches the model to
// predict the majority label.
//
// Strategy: majority-class DOWN-sampling. Every class is reduced,
// by sampling without replacement, to the size of the smallest
// class. Minority examples are never duplicated or synthesised.
//
//   before: {1: 800, 0: 200}
//   after:  {1: 200, 0: 200}
//
// Only the training split is balanced; validation keeps the real
// distribution so its loss stays honest.

use std::collections::BTreeMap;

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::domain::example::Example;

/// Count examples per class id. Regression examples are ignored.
pub fn class_counts(examples: &[Example]) -> BTreeMap<usize, usize> {
    let mut counts = BTreeMap::new();
    for c in examples.iter().filter_map(Example::class) {
        *counts.entry(c).or_insert(0) += 1;
    }
    counts
}

/// Down-sample every class to the minority count.
/// Regression examples (no class) pass through unchanged.
pub fn balance_by_downsampling(examples: Vec<Example>, seed: u64) -> Vec<Example> {
    let counts = class_counts(&examples);
    let Some(&minority) = counts.values().min() else {
        return examples;
    };

    tracing::info!("Balancing: before {:?}, target {} per class", counts, minority);

    let mut by_class: BTreeMap<usize, Vec<Example>> = BTreeMap::new();
    let mut passthrough = Vec::new();
    for ex in examples {
        match ex.class() {
            Some(c) => by_class.entry(c).or_default().push(ex),
            None    => passthrough.push(ex),
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut balanced = passthrough;
    for (_, mut group) in by_class {
        group.shuffle(&mut rng);
        group.truncate(minority);
        balanced.extend(group);
    }
    balanced.shuffle(&mut rng);

    tracing::info!("Balancing: after {:?}", class_counts(&balanced));
    balanced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::example::Label;

    fn corpus(majority: usize, minority: usize) -> Vec<Example> {
        let mut v = Vec::new();
        for i in 0..majority {
            v.push(Example::new(format!("good {i}"), Label::Class(1)));
        }
        for i in 0..minority {
            v.push(Example::new(format!("bad {i}"), Label::Class(0)));
        }
        v
    }

    #[test]
    fn test_majority_is_downsampled_to_minority() {
        let balanced = balance_by_downsampling(corpus(800, 200), 42);
        let counts = class_counts(&balanced);
        assert_eq!(counts[&1], 200);
        assert_eq!(counts[&0], 200);
        assert_eq!(balanced.len(), 400);
    }

    #[test]
    fn test_minority_examples_all_survive() {
        let balanced = balance_by_downsampling(corpus(50, 10), 7);
        let minority: Vec<_> = balanced.iter().filter(|e| e.class() == Some(0)).collect();
        assert_eq!(minority.len(), 10);
    }

    #[test]
    fn test_same_seed_same_selection() {
        let a = balance_by_downsampling(corpus(30, 5), 3);
        let b = balance_by_downsampling(corpus(30, 5), 3);
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_input() {
        assert!(balance_by_downsampling(Vec::new(), 1).is_empty());
    }
}
