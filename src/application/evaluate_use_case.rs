// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Scores a trained checkpoint on held-out data:
//
//   Step 1: Rebuild config, tokenizer, encoder, scorer
//   Step 2: Pick the data: an explicit file, or the validation
//           split the run itself held out (same seed → same rows)
//   Step 3: Evaluate on the inner backend
//   Step 4: Write evaluation.json + error_analysis.csv
//
// Reference: Burn Book §5 (Inference)

use std::path::{Path, PathBuf};

use anyhow::Result;
use burn::tensor::backend::AutodiffBackend;

use crate::application::{
    artifacts::Artifacts,
    prepare::{load_clean_examples, split_examples},
    train_use_case::TrainConfig,
};
use crate::data::dataset::SentimentDataset;
use crate::infra::{checkpoint::BEST_MODEL, metrics::write_error_analysis};
use crate::ml::{
    backend::{dispatch, BackendKind, BackendTask},
    evaluator::{evaluate, Evaluation},
};

const EVALUATION_FILE: &str = "evaluation.json";
const ERRORS_FILE:     &str = "error_analysis.csv";

#[derive(Debug, Clone)]
pub struct EvaluateConfig {
    pub checkpoint_dir: String,
    /// None re-creates the run's own validation split
    pub data_path:      Option<String>,
    pub weights:        String,
    pub batch_size:     usize,
    /// Reports go here; defaults to the checkpoint dir
    pub output_dir:     Option<String>,
    pub backend:        BackendKind,
}

impl Default for EvaluateConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: "checkpoints".to_string(),
            data_path:      None,
            weights:        BEST_MODEL.to_string(),
            batch_size:     32,
            output_dir:     None,
            backend:        BackendKind::default(),
        }
    }
}

/// Write `evaluation.json`, plus `error_analysis.csv` in
/// classification mode, into `dir`.
pub fn write_reports(dir: &Path, evaluation: &Evaluation) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let json = serde_json::to_string_pretty(evaluation)?;
    std::fs::write(dir.join(EVALUATION_FILE), json)?;
    if evaluation.report.is_classification() {
        write_error_analysis(&dir.join(ERRORS_FILE), &evaluation.errors)?;
    }
    tracing::info!("Evaluation written to '{}'", dir.join(EVALUATION_FILE).display());
    Ok(())
}

pub struct EvaluateUseCase {
    config: EvaluateConfig,
}

impl EvaluateUseCase {
    pub fn new(config: EvaluateConfig) -> Self {
        Self { config }
    }

    pub fn execute(self) -> Result<Evaluation> {
        let backend = self.config.backend;
        dispatch(backend, self)
    }
}

impl BackendTask for EvaluateUseCase {
    type Output = Evaluation;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> Result<Evaluation> {
        let cfg = &self.config;

        // ── Step 1: Rebuild the trained pipeline ──────────────────────────────
        let art = Artifacts::<B::InnerBackend>::load(&cfg.checkpoint_dir, &cfg.weights, &device)?;

        // ── Step 2: Held-out examples ─────────────────────────────────────────
        let examples = match &cfg.data_path {
            Some(path) => {
                let file_cfg = TrainConfig { data_path: path.clone(), ..art.config.clone() };
                load_clean_examples(&file_cfg)?
            }
            None => {
                tracing::info!("No data file given; re-creating the training run's validation split");
                split_examples(&art.config, load_clean_examples(&art.config)?).1
            }
        };
        let dataset = SentimentDataset::from_examples(
            &examples, &art.tokenizer, &art.config.task, art.config.max_seq_len,
        )?;
        tracing::info!("Evaluating on {} examples", dataset.sample_count());

        // ── Step 3: Score ─────────────────────────────────────────────────────
        let evaluation = evaluate::<B::InnerBackend, _, _>(
            &art.scorer, &art.encoder, &dataset, &art.config.task, cfg.batch_size, &device,
        )?;

        // ── Step 4: Reports ───────────────────────────────────────────────────
        let out_dir = PathBuf::from(cfg.output_dir.as_deref().unwrap_or(&cfg.checkpoint_dir));
        write_reports(&out_dir, &evaluation)?;
        Ok(evaluation)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::classification::ErrorCase;
    use crate::analysis::regression::{DimensionError, RegressionReport};
    use crate::ml::evaluator::EvaluationReport;

    #[test]
    fn test_regression_reports_skip_error_csv() {
        let tmp = tempfile::tempdir().unwrap();
        let evaluation = Evaluation {
            loss:   0.1,
            report: EvaluationReport::Regression(RegressionReport {
                dimensions: vec![DimensionError { name: "valence".into(), mae: 0.2, rmse: 0.3 }],
                mean_normalized_mse: 0.01,
                total: 4,
            }),
            errors: vec![ErrorCase { text: "x".into(), predicted: "a".into(), actual: "b".into() }],
        };
        write_reports(tmp.path(), &evaluation).unwrap();

        let json = std::fs::read_to_string(tmp.path().join(EVALUATION_FILE)).unwrap();
        assert!(json.contains("\"mode\": \"regression\""));
        assert!(!tmp.path().join(ERRORS_FILE).exists());
    }
}
