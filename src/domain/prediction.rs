// ============================================================
// Layer 3 — Prediction
// ============================================================
// The inference contract handed to any serving layer:
//
//   classification → label + probabilities + confidence
//   regression     → named scores in each dimension's physical range
//
// `confidence` is the largest class probability and is absent in
// regression mode.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted class name (classification) or strongest dimension name
    pub label: String,

    /// (name, value) per output in head order; physical units for regression
    pub scores: Vec<(String, f64)>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<Vec<f64>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Prediction {
    pub fn score(&self, name: &str) -> Option<f64> {
        self.scores.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }
}
