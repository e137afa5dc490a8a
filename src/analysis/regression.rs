// ============================================================
// Layer 7 — Regression Metrics
// ============================================================
// Predictions and targets arrive in unit space [0, 1]. Errors are
// reported per dimension in PHYSICAL units (after denormalising),
// plus one overall MSE in unit space that matches the training loss.

use serde::{Deserialize, Serialize};

use crate::domain::dimension::DimensionSpec;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionError {
    pub name: String,
    pub mae:  f64,
    pub rmse: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionReport {
    pub dimensions:          Vec<DimensionError>,
    pub mean_normalized_mse: f64,
    pub total:               usize,
}

pub fn regression_report(
    predicted:  &[Vec<f64>],
    targets:    &[Vec<f64>],
    dimensions: &[DimensionSpec],
) -> RegressionReport {
    let n = predicted.len().min(targets.len());
    let mut abs_sum  = vec![0.0; dimensions.len()];
    let mut sq_sum   = vec![0.0; dimensions.len()];
    let mut unit_sq  = 0.0;

    for (p_row, t_row) in predicted.iter().zip(targets).take(n) {
        for (d, spec) in dimensions.iter().enumerate() {
            let (p, t) = (p_row[d], t_row[d]);
            unit_sq += (p - t).powi(2);
            let diff = spec.denormalize(p) - spec.denormalize(t);
            abs_sum[d] += diff.abs();
            sq_sum[d]  += diff * diff;
        }
    }

    let nf = n.max(1) as f64;
    RegressionReport {
        dimensions: dimensions
            .iter()
            .enumerate()
            .map(|(d, spec)| DimensionError {
                name: spec.name.clone(),
                mae:  abs_sum[d] / nf,
                rmse: (sq_sum[d] / nf).sqrt(),
            })
            .collect(),
        mean_normalized_mse: unit_sq / (nf * dimensions.len().max(1) as f64),
        total: n,
    }
}
