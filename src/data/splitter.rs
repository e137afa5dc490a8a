// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Shuffles examples with a seeded RNG and splits them into:
//   - Training set:   used to update model weights
//   - Validation set: drives early stopping and the search objective
//
// For classification the split is STRATIFIED: each class is
// split separately at the same ratio, so a rare class cannot end
// up entirely on one side.
//
// Split ratio: 80% training, 20% validation (configurable)
//
// Reference: rand crate documentation

use std::collections::BTreeMap;

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::domain::example::Example;

/// Seeded shuffle, then cut at `train_fraction`.
pub fn split_train_val<T>(mut samples: Vec<T>, train_fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total    = samples.len();
    let split_at = ((total as f64) * train_fraction).round() as usize;
    let split_at = split_at.min(total);

    let val = samples.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation",
        samples.len(),
        val.len(),
    );

    (samples, val)
}

/// Split per class so both sides keep the class proportions.
/// Examples without a class id are split as one extra group.
pub fn stratified_split(
    examples:       Vec<Example>,
    train_fraction: f64,
    seed:           u64,
) -> (Vec<Example>, Vec<Example>) {
    let mut groups: BTreeMap<Option<usize>, Vec<Example>> = BTreeMap::new();
    for ex in examples {
        groups.entry(ex.class()).or_default().push(ex);
    }

    let mut train = Vec::new();
    let mut val   = Vec::new();
    for (offset, (_, group)) in groups.into_iter().enumerate() {
        let (t, v) = split_train_val(group, train_fraction, seed.wrapping_add(offset as u64));
        train.extend(t);
        val.extend(v);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    train.shuffle(&mut rng);
    val.shuffle(&mut rng);
    (train, val)
}
