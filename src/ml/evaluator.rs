// ============================================================
// Layer 5 — Evaluator
// ============================================================
// Runs a trained scorer over a held-out dataset (inner backend,
// no gradients, no dropout) and hands the numbers to Layer 7.
//
//   score_dataset   tensors → ScoredRow { text, unit outputs, target }
//   summarize       ScoredRow → report (pure, no model access)
//
// Unit outputs are class probabilities in classification mode and
// [0, 1] scores in regression mode.

use burn::{data::dataloader::batcher::Batcher, prelude::*};
use serde::{Deserialize, Serialize};

use crate::analysis::{
    classification::{
        argmax, classification_report, confusion_matrix, mean_probabilities, misclassified,
        per_class_accuracy, ClassificationReport, ErrorCase,
    },
    regression::{regression_report, RegressionReport},
    roc::{one_vs_rest, RocCurve},
};
use crate::data::{
    batcher::SentimentBatcher,
    dataset::{SentimentDataset, Target},
};
use crate::domain::{error::ScorerError, example::TaskMode};
use crate::ml::{
    encoder::TextEncoder,
    model::{scoring_loss, Scorer},
};

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRow {
    pub text:   String,
    pub unit:   Vec<f64>,
    pub target: Target,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationEvaluation {
    pub report:             ClassificationReport,
    pub confusion_matrix:   Vec<Vec<usize>>,
    pub per_class_accuracy: Vec<f64>,
    pub mean_probabilities: Vec<f64>,
    pub roc:                Vec<RocCurve>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EvaluationReport {
    Classification(ClassificationEvaluation),
    Regression(RegressionReport),
}

impl EvaluationReport {
    pub fn is_classification(&self) -> bool {
        matches!(self, EvaluationReport::Classification(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub loss:   f64,
    pub report: EvaluationReport,
    /// Written separately as error_analysis.csv
    #[serde(skip)]
    pub errors: Vec<ErrorCase>,
}

/// Score every item of `dataset`; also returns the sample-weighted mean loss.
pub fn score_dataset<B, S, E>(
    scorer:     &S,
    encoder:    &E,
    dataset:    &SentimentDataset,
    batch_size: usize,
    device:     &B::Device,
) -> Result<(Vec<ScoredRow>, f64), ScorerError>
where
    B: Backend,
    S: Scorer<B>,
    E: TextEncoder<B>,
{
    let batcher  = SentimentBatcher::<B>::new(device.clone());
    let mode     = scorer.output_mode();
    let k        = scorer.num_outputs();
    let mut rows = Vec::with_capacity(dataset.sample_count());
    let mut loss_sum = 0.0f64;

    for chunk in dataset.items().chunks(batch_size.max(1)) {
        let batch   = batcher.batch(chunk.to_vec());
        let summary = encoder.encode(batch.token_ids.clone(), batch.pad_mask());
        let outputs = scorer.score(summary);

        let loss = scoring_loss(mode, outputs.clone(), &batch.targets, None)?;
        loss_sum += loss.into_scalar().elem::<f64>() * chunk.len() as f64;

        let flat: Vec<f64> = mode.to_unit(outputs).into_data().iter::<f64>().collect();
        for (item, unit) in chunk.iter().zip(flat.chunks(k)) {
            rows.push(ScoredRow {
                text:   item.text.clone(),
                unit:   unit.to_vec(),
                target: item.target.clone(),
            });
        }
    }

    let loss = loss_sum / rows.len().max(1) as f64;
    tracing::debug!("Scored {} examples, mean loss {:.4}", rows.len(), loss);
    Ok((rows, loss))
}

/// Turn scored rows into the report for `task`.
pub fn summarize(task: &TaskMode, rows: &[ScoredRow], loss: f64) -> Result<Evaluation, ScorerError> {
    match task {
        TaskMode::Classification { num_classes, .. } => {
            let names = task.output_names();
            let mut actual = Vec::with_capacity(rows.len());
            for row in rows {
                match row.target {
                    Target::Class(c) => actual.push(c),
                    Target::Scores(_) => {
                        return Err(ScorerError::Data("score target in a classification dataset".into()))
                    }
                }
            }
            let probabilities: Vec<Vec<f64>> = rows.iter().map(|r| r.unit.clone()).collect();
            let predicted: Vec<usize> = probabilities.iter().map(|p| argmax(p)).collect();
            let texts: Vec<String> = rows.iter().map(|r| r.text.clone()).collect();

            let matrix = confusion_matrix(&actual, &predicted, *num_classes);
            Ok(Evaluation {
                loss,
                report: EvaluationReport::Classification(ClassificationEvaluation {
                    report:             classification_report(&actual, &predicted, &names),
                    per_class_accuracy: per_class_accuracy(&matrix),
                    confusion_matrix:   matrix,
                    mean_probabilities: mean_probabilities(&probabilities, *num_classes),
                    roc:                one_vs_rest(&actual, &probabilities, *num_classes),
                }),
                errors: misclassified(&texts, &actual, &predicted, &names),
            })
        }
        TaskMode::Regression { dimensions } => {
            let mut targets = Vec::with_capacity(rows.len());
            for row in rows {
                match &row.target {
                    Target::Scores(s) => targets.push(s.iter().map(|&v| v as f64).collect::<Vec<f64>>()),
                    Target::Class(_) => {
                        return Err(ScorerError::Data("class target in a regression dataset".into()))
                    }
                }
            }
            let predicted: Vec<Vec<f64>> = rows.iter().map(|r| r.unit.clone()).collect();
            Ok(Evaluation {
                loss,
                report: EvaluationReport::Regression(regression_report(&predicted, &targets, dimensions)),
                errors: Vec::new(),
            })
        }
    }
}

pub fn evaluate<B, S, E>(
    scorer:     &S,
    encoder:    &E,
    dataset:    &SentimentDataset,
    task:       &TaskMode,
    batch_size: usize,
    device:     &B::Device,
) -> Result<Evaluation, ScorerError>
where
    B: Backend,
    S: Scorer<B>,
    E: TextEncoder<B>,
{
    let (rows, loss) = score_dataset(scorer, encoder, dataset, batch_size, device)?;
    summarize(task, &rows, loss)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::SentimentItem;
    use crate::domain::dimension::DimensionSpec;
    use crate::ml::encoder::TransformerEncoderConfig;
    use crate::ml::model::{OutputMode, SentimentModelConfig};
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn row(unit: Vec<f64>, class: usize) -> ScoredRow {
        ScoredRow { text: format!("t{class}"), unit, target: Target::Class(class) }
    }

    #[test]
    fn test_summarize_classification() {
        let rows = vec![
            row(vec![0.1, 0.2, 0.7], 2),
            row(vec![0.6, 0.3, 0.1], 1),
            row(vec![0.2, 0.5, 0.3], 1),
        ];
        let eval = summarize(&TaskMode::sentiment(), &rows, 0.4).unwrap();
        let EvaluationReport::Classification(c) = eval.report else { panic!("wrong mode") };
        assert_eq!(c.confusion_matrix[1], vec![1, 1, 0]);
        assert!((c.report.accuracy - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(c.roc.len(), 3);
        assert_eq!(eval.errors.len(), 1);
        assert_eq!(eval.errors[0].predicted, "negative");
        assert_eq!(eval.errors[0].actual, "neutral");
    }

    #[test]
    fn test_summarize_rejects_mismatched_targets() {
        let rows = vec![ScoredRow { text: "x".into(), unit: vec![0.5], target: Target::Scores(vec![0.5]) }];
        assert!(summarize(&TaskMode::sentiment(), &rows, 0.0).is_err());
    }

    #[test]
    fn test_score_dataset_end_to_end() {
        let device  = Default::default();
        let encoder = TransformerEncoderConfig::new(120, 4, 8, 2, 1, 16)
            .init::<TestBackend>(&device)
            .unwrap();
        let task = TaskMode::Regression {
            dimensions: vec![DimensionSpec::new("valence", -1.0, 1.0), DimensionSpec::new("stress", 0.0, 40.0)],
        };
        let model = SentimentModelConfig::new(8, 2, OutputMode::Sigmoid)
            .init::<TestBackend>(&device)
            .unwrap();
        let items = (0..5)
            .map(|i| SentimentItem {
                text:           format!("text {i}"),
                input_ids:      vec![101, 110 + i, 102, 0],
                attention_mask: vec![1, 1, 1, 0],
                target:         Target::Scores(vec![0.5, 0.25]),
            })
            .collect();
        let dataset = SentimentDataset::new(items);

        let eval = evaluate(&model, &encoder, &dataset, &task, 2, &device).unwrap();
        assert!(eval.loss.is_finite());
        let EvaluationReport::Regression(r) = eval.report else { panic!("wrong mode") };
        assert_eq!(r.total, 5);
        assert_eq!(r.dimensions[1].name, "stress");
    }
}
