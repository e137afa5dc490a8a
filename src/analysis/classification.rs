// ============================================================
// Layer 7 — Classification Metrics
// ============================================================
// Pure functions over (actual, predicted) class ids. Nothing here
// touches a model or a tensor.
//
//   confusion matrix      rows = actual, columns = predicted
//   precision_c           TP / (TP + FP)   (0 when nothing predicted c)
//   recall_c              TP / (TP + FN)   (0 when c never occurs)
//   f1_c                  harmonic mean of the two
//   per-class accuracy    diagonal / row total

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub name:      String,
    pub precision: f64,
    pub recall:    f64,
    pub f1:        f64,
    pub support:   usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Averages {
    pub precision: f64,
    pub recall:    f64,
    pub f1:        f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes:      Vec<ClassMetrics>,
    pub accuracy:     f64,
    pub macro_avg:    Averages,
    pub weighted_avg: Averages,
    pub total:        usize,
}

/// One misclassified example, labelled with class names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorCase {
    pub text:      String,
    pub predicted: String,
    pub actual:    String,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// Index of the largest value; the first one wins a tie.
pub fn argmax(row: &[f64]) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}

/// `num_classes × num_classes`, rows = actual. Out-of-range ids are ignored.
pub fn confusion_matrix(actual: &[usize], predicted: &[usize], num_classes: usize) -> Vec<Vec<usize>> {
    let mut matrix = vec![vec![0usize; num_classes]; num_classes];
    for (&a, &p) in actual.iter().zip(predicted) {
        if a < num_classes && p < num_classes {
            matrix[a][p] += 1;
        }
    }
    matrix
}

pub fn per_class_accuracy(matrix: &[Vec<usize>]) -> Vec<f64> {
    matrix
        .iter()
        .enumerate()
        .map(|(i, row)| ratio(row[i], row.iter().sum()))
        .collect()
}

pub fn classification_report(
    actual:      &[usize],
    predicted:   &[usize],
    class_names: &[String],
) -> ClassificationReport {
    let k      = class_names.len();
    let matrix = confusion_matrix(actual, predicted, k);
    let total  = actual.len().min(predicted.len());

    let classes: Vec<ClassMetrics> = (0..k)
        .map(|c| {
            let tp        = matrix[c][c];
            let support   = matrix[c].iter().sum::<usize>();
            let predicted_c = (0..k).map(|r| matrix[r][c]).sum::<usize>();
            let precision = ratio(tp, predicted_c);
            let recall    = ratio(tp, support);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            ClassMetrics { name: class_names[c].clone(), precision, recall, f1, support }
        })
        .collect();

    let correct = (0..k).map(|c| matrix[c][c]).sum::<usize>();
    let kf      = k.max(1) as f64;
    let support_total = classes.iter().map(|c| c.support).sum::<usize>().max(1) as f64;
    let weighted = |f: fn(&ClassMetrics) -> f64| {
        classes.iter().map(|c| f(c) * c.support as f64).sum::<f64>() / support_total
    };

    ClassificationReport {
        accuracy: ratio(correct, total),
        macro_avg: Averages {
            precision: classes.iter().map(|c| c.precision).sum::<f64>() / kf,
            recall:    classes.iter().map(|c| c.recall).sum::<f64>() / kf,
            f1:        classes.iter().map(|c| c.f1).sum::<f64>() / kf,
        },
        weighted_avg: Averages {
            precision: weighted(|c| c.precision),
            recall:    weighted(|c| c.recall),
            f1:        weighted(|c| c.f1),
        },
        classes,
        total,
    }
}

/// Column means of the predicted probability rows.
pub fn mean_probabilities(probabilities: &[Vec<f64>], num_classes: usize) -> Vec<f64> {
    let mut sums = vec![0.0; num_classes];
    for row in probabilities {
        for (s, p) in sums.iter_mut().zip(row) {
            *s += p;
        }
    }
    let n = probabilities.len().max(1) as f64;
    sums.into_iter().map(|s| s / n).collect()
}

/// Every example whose predicted class differs from its actual class.
pub fn misclassified(
    texts:       &[String],
    actual:      &[usize],
    predicted:   &[usize],
    class_names: &[String],
) -> Vec<ErrorCase> {
    let name = |c: usize| class_names.get(c).cloned().unwrap_or_else(|| c.to_string());
    texts
        .iter()
        .zip(actual.iter().zip(predicted))
        .filter(|(_, (a, p))| a != p)
        .map(|(text, (&a, &p))| ErrorCase { text: text.clone(), predicted: name(p), actual: name(a) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["neg".into(), "pos".into()]
    }

    #[test]
    fn test_confusion_matrix_rows_are_actual() {
        let m = confusion_matrix(&[0, 0, 1, 1, 1], &[0, 1, 1, 1, 0], 2);
        assert_eq!(m, vec![vec![1, 1], vec![1, 2]]);
        assert_eq!(per_class_accuracy(&m), vec![0.5, 2.0 / 3.0]);
    }

    #[test]
    fn test_report_values() {
        let r = classification_report(&[0, 0, 1, 1, 1], &[0, 1, 1, 1, 0], &names());
        assert!((r.accuracy - 0.6).abs() < 1e-12);
        let pos = &r.classes[1];
        assert!((pos.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((pos.recall - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(pos.support, 3);
        assert!((r.macro_avg.recall - (0.5 + 2.0 / 3.0) / 2.0).abs() < 1e-12);
        assert!((r.weighted_avg.recall - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_class_never_predicted_has_zero_precision() {
        let r = classification_report(&[0, 1], &[0, 0], &names());
        assert_eq!(r.classes[1].precision, 0.0);
        assert_eq!(r.classes[1].f1, 0.0);
    }

    #[test]
    fn test_error_list_uses_class_names() {
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let errors = misclassified(&texts, &[0, 1, 1], &[0, 0, 1], &names());
        assert_eq!(
            errors,
            vec![ErrorCase { text: "b".into(), predicted: "neg".into(), actual: "pos".into() }]
        );
    }

    #[test]
    fn test_mean_probabilities_and_argmax() {
        let probs = vec![vec![0.2, 0.8], vec![0.6, 0.4]];
        let mean = mean_probabilities(&probs, 2);
        assert!((mean[0] - 0.4).abs() < 1e-12 && (mean[1] - 0.6).abs() < 1e-12);
        assert_eq!(argmax(&[0.1, 0.7, 0.7]), 1);
    }
}
