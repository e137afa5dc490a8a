// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer talks to these traits, not to concrete
// loaders or models:
//
//   ExampleSource — anything that yields labelled examples
//                   (CSV file, JSON file, an in-memory Vec in tests)
//   Predictor     — anything that turns text into a Prediction
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;

use crate::domain::example::{Example, TaskMode};
use crate::domain::prediction::Prediction;

// ─── ExampleSource ────────────────────────────────────────────────────────────
/// Any component that can load labelled examples for a given task.
///
/// Implementations:
///   - CsvExampleSource  → one row per example
///   - JsonExampleSource → array of {text, label} objects
///   - Vec<Example>      → already-loaded data
pub trait ExampleSource {
    /// Load every example whose label fits `mode`.
    /// Rows that do not fit are dropped, not reported as errors.
    fn load_examples(&self, mode: &TaskMode) -> Result<Vec<Example>>;
}

impl ExampleSource for Vec<Example> {
    fn load_examples(&self, mode: &TaskMode) -> Result<Vec<Example>> {
        Ok(self
            .iter()
            .filter(|e| mode.validate_label(&e.label).is_ok())
            .cloned()
            .collect())
    }
}

// ─── Predictor ────────────────────────────────────────────────────────────────
/// Any component that can score a span of text.
pub trait Predictor {
    fn predict(&self, text: &str) -> Result<Prediction>;
}
