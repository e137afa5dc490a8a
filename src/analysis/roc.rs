// ============================================================
// Layer 7 — ROC / AUC
// ============================================================
// One-vs-rest ROC per class from predicted probabilities.
//
// Thresholds sweep every DISTINCT score from high to low, so tied
// scores move the curve diagonally instead of in a staircase. The
// curve starts at (0, 0) and ends at (1, 1); AUC is the trapezoid
// rule over it. A class with no positives or no negatives has no
// defined curve and gets AUC = NaN.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    pub fpr:        Vec<f64>,
    pub tpr:        Vec<f64>,
    pub thresholds: Vec<f64>,
    pub auc:        f64,
}

pub fn trapezoid_auc(fpr: &[f64], tpr: &[f64]) -> f64 {
    fpr.windows(2)
        .zip(tpr.windows(2))
        .map(|(x, y)| (x[1] - x[0]) * (y[1] + y[0]) / 2.0)
        .sum()
}

pub fn roc_curve(is_positive: &[bool], scores: &[f64]) -> RocCurve {
    let positives = is_positive.iter().filter(|&&p| p).count();
    let negatives = is_positive.len() - positives;

    let mut order: Vec<usize> = (0..scores.len().min(is_positive.len())).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut fpr        = vec![0.0];
    let mut tpr        = vec![0.0];
    let mut thresholds = vec![f64::INFINITY];
    let (mut tp, mut fp) = (0usize, 0usize);

    for (pos, &i) in order.iter().enumerate() {
        if is_positive[i] { tp += 1 } else { fp += 1 }
        // Emit a point only after the last sample sharing this score
        let last_of_score = order.get(pos + 1).map_or(true, |&j| scores[j] != scores[i]);
        if last_of_score {
            fpr.push(if negatives > 0 { fp as f64 / negatives as f64 } else { 0.0 });
            tpr.push(if positives > 0 { tp as f64 / positives as f64 } else { 0.0 });
            thresholds.push(scores[i]);
        }
    }

    let auc = if positives == 0 || negatives == 0 { f64::NAN } else { trapezoid_auc(&fpr, &tpr) };
    RocCurve { fpr, tpr, thresholds, auc }
}

/// ROC of class c vs the rest, for every class c.
pub fn one_vs_rest(actual: &[usize], probabilities: &[Vec<f64>], num_classes: usize) -> Vec<RocCurve> {
    (0..num_classes)
        .map(|c| {
            let labels: Vec<bool> = actual.iter().map(|&a| a == c).collect();
            let scores: Vec<f64> = probabilities
                .iter()
                .map(|row| row.get(c).copied().unwrap_or(0.0))
                .collect();
            roc_curve(&labels, &scores)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_separation_has_unit_auc() {
        let roc = roc_curve(&[true, true, false, false], &[0.9, 0.8, 0.3, 0.1]);
        assert!((roc.auc - 1.0).abs() < 1e-12);
        assert_eq!(roc.fpr.first(), Some(&0.0));
        assert_eq!(roc.tpr.last(), Some(&1.0));
    }

    #[test]
    fn test_tied_scores_give_half_auc() {
        let roc = roc_curve(&[true, false], &[0.5, 0.5]);
        assert_eq!(roc.fpr, vec![0.0, 1.0]);
        assert!((roc.auc - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_known_auc() {
        // one inverted pair out of four pos/neg pairs → 0.75
        let roc = roc_curve(&[true, false, true, false], &[0.9, 0.8, 0.7, 0.1]);
        assert!((roc.auc - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_single_class_auc_is_nan() {
        assert!(roc_curve(&[true, true], &[0.2, 0.4]).auc.is_nan());
    }

    #[test]
    fn test_one_vs_rest_builds_curve_per_class() {
        let probs = vec![vec![0.9, 0.1], vec![0.2, 0.8], vec![0.6, 0.4]];
        let curves = one_vs_rest(&[0, 1, 0], &probs, 2);
        assert_eq!(curves.len(), 2);
        assert!((curves[0].auc - 1.0).abs() < 1e-12);
        assert!((curves[1].auc - 1.0).abs() < 1e-12);
    }
}
