// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates one full training run in order:
//
//   Step 1: Load + clean labelled examples  (Layer 4 - data)
//   Step 2: Split train/validation, balance (Layer 4 - data)
//   Step 3: Build / load tokenizer          (Layer 6 - infra)
//   Step 4: Build datasets                  (Layer 4 - data)
//   Step 5: Build frozen encoder            (Layer 5 - ml)
//   Step 6: Save config for inference       (Layer 6 - infra)
//   Step 7: Run the training engine         (Layer 5 - ml)
//   Step 8: Evaluate the best checkpoint    (Layer 5 → Layer 7)
//
// Steps 1-5 live in prepare.rs because search runs them too.
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use std::sync::Arc;

use anyhow::Result;
use burn::{module::AutodiffModule, tensor::backend::AutodiffBackend};
use serde::{Deserialize, Serialize};

use crate::application::{
    evaluate_use_case::write_reports,
    prepare::{build_encoder, prepare_training_data, PreparedData},
};
use crate::domain::{error::ScorerError, example::TaskMode, trial::TrialConfig};
use crate::infra::{
    checkpoint::{CheckpointManager, BEST_MODEL},
    metrics::MetricsLogger,
};
use crate::ml::{
    backend::{dispatch, BackendKind, BackendTask},
    encoder::{TransformerEncoder, TransformerEncoderConfig},
    ensemble::EnsembleConfig,
    evaluator::{evaluate, Evaluation},
    model::{Scorer, SentimentModelConfig},
    trainer::{EngineConfig, StopReason, TrainingEngine},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// Everything a run needs, saved as train_config.json so evaluation
// and inference can rebuild the identical architecture and task.
// Fields missing from an older file take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    // ── Data ──
    pub data_path:      String,
    pub text_column:    String,
    /// One column for classification, one per dimension for regression
    pub label_columns:  Vec<String>,
    pub checkpoint_dir: String,
    pub log_dir:        Option<String>,
    pub task:           TaskMode,
    pub val_fraction:   f64,
    /// Down-sample training classes to the minority count
    pub balance:        bool,
    pub seed:           u64,
    pub num_workers:    usize,
    pub backend:        BackendKind,

    // ── Encoder ──
    pub max_seq_len:     usize,
    pub vocab_size:      usize,
    pub hidden_size:     usize,
    pub num_heads:       usize,
    pub num_layers:      usize,
    pub d_ff:            usize,
    pub encoder_weights: Option<String>,

    // ── Scorer ──
    pub dropout:       f64,
    pub refiner_heads: Option<usize>,
    /// 1 trains a single model; more trains an attention-weighted ensemble
    pub ensemble_size: usize,

    // ── Optimisation ──
    pub epochs:              usize,
    pub batch_size:          usize,
    pub learning_rate:       f64,
    pub weight_decay:        f64,
    pub warmup_ratio:        f64,
    pub max_grad_norm:       f64,
    pub accumulation_steps:  usize,
    pub mixed_precision:     bool,
    pub adversarial_epsilon: f64,
    pub patience:            usize,
    pub min_delta:           f64,
    pub time_budget_secs:    Option<f64>,
    pub dim_weights:         Option<Vec<f32>>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_path:      "data/reviews.csv".to_string(),
            text_column:    "review".to_string(),
            label_columns:  vec!["label".to_string()],
            checkpoint_dir: "checkpoints".to_string(),
            log_dir:        None,
            task:           TaskMode::sentiment(),
            val_fraction:   0.2,
            balance:        true,
            seed:           42,
            num_workers:    2,
            backend:        BackendKind::default(),

            max_seq_len:     128,
            vocab_size:      30522,
            hidden_size:     256,
            num_heads:       8,
            num_layers:      4,
            d_ff:            1024,
            encoder_weights: None,

            dropout:       0.15,
            refiner_heads: None,
            ensemble_size: 1,

            epochs:              10,
            batch_size:          8,
            learning_rate:       1.7e-5,
            weight_decay:        0.0117,
            warmup_ratio:        0.1,
            max_grad_norm:       1.0,
            accumulation_steps:  1,
            mixed_precision:     false,
            adversarial_epsilon: 0.0,
            patience:            3,
            min_delta:           0.0,
            time_budget_secs:    None,
            dim_weights:         None,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<(), ScorerError> {
        if !(self.val_fraction > 0.0 && self.val_fraction < 1.0) {
            return Err(ScorerError::Configuration(format!(
                "val_fraction must lie in (0, 1), got {}", self.val_fraction
            )));
        }
        if self.ensemble_size == 0 {
            return Err(ScorerError::Configuration("ensemble_size must be at least 1".into()));
        }
        if let TaskMode::Regression { dimensions } = &self.task {
            if self.label_columns.len() != dimensions.len() {
                return Err(ScorerError::Configuration(format!(
                    "{} label columns for {} regression dimensions",
                    self.label_columns.len(), dimensions.len()
                )));
            }
        }
        if let Some(w) = &self.dim_weights {
            if w.len() != self.task.output_size() {
                return Err(ScorerError::Configuration(format!(
                    "{} dimension weights for {} outputs", w.len(), self.task.output_size()
                )));
            }
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_epochs:          self.epochs,
            batch_size:          self.batch_size,
            learning_rate:       self.learning_rate,
            weight_decay:        self.weight_decay,
            warmup_ratio:        self.warmup_ratio,
            max_grad_norm:       self.max_grad_norm,
            accumulation_steps:  self.accumulation_steps,
            mixed_precision:     self.mixed_precision,
            adversarial_epsilon: self.adversarial_epsilon,
            patience:            self.patience,
            min_delta:           self.min_delta,
            seed:                self.seed,
            num_workers:         self.num_workers,
            time_budget_secs:    self.time_budget_secs,
            dim_weights:         self.dim_weights.clone(),
        }
    }

    /// `vocab_size` here is the tokenizer's id space, not the target
    /// vocabulary size the tokenizer was built with.
    pub fn encoder_config(&self, vocab_size: usize) -> TransformerEncoderConfig {
        TransformerEncoderConfig::new(
            vocab_size,
            self.max_seq_len,
            self.hidden_size,
            self.num_heads,
            self.num_layers,
            self.d_ff,
        )
    }

    /// Config of one scorer (or of each ensemble member).
    pub fn model_config(&self) -> SentimentModelConfig {
        SentimentModelConfig::for_task(self.hidden_size, &self.task)
            .with_dropout(self.dropout)
            .with_refiner_heads(self.refiner_heads)
    }

    /// The searchable subset, used as the base every trial overrides.
    pub fn trial_config(&self) -> TrialConfig {
        TrialConfig {
            learning_rate: self.learning_rate,
            weight_decay:  self.weight_decay,
            dropout_rate:  self.dropout,
            batch_size:    self.batch_size,
        }
    }

    /// This config with a trial's hyperparameters applied.
    pub fn with_trial(&self, trial: &TrialConfig) -> Self {
        Self {
            learning_rate: trial.learning_rate,
            weight_decay:  trial.weight_decay,
            dropout:       trial.dropout_rate,
            batch_size:    trial.batch_size,
            ..self.clone()
        }
    }

    /// Where metrics.csv and train.log go.
    pub fn metrics_dir(&self) -> &str {
        self.log_dir.as_deref().unwrap_or(&self.checkpoint_dir)
    }
}

// ─── Report ──────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub epochs_run:     usize,
    pub best_epoch:     usize,
    pub best_val_loss:  f64,
    pub final_val_loss: f64,
    pub stop_reason:    StopReason,
    pub skipped_steps:  usize,
    /// Held-out evaluation of the best checkpoint
    pub evaluation:     Evaluation,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Run the full pipeline on the configured backend.
    pub fn execute(self) -> Result<TrainReport> {
        let backend = self.config.backend;
        dispatch(backend, self)
    }
}

impl BackendTask for TrainUseCase {
    type Output = TrainReport;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> Result<TrainReport> {
        let cfg = &self.config;
        cfg.validate()?;

        // ── Steps 1-4: examples → tokenizer → datasets ───────────────────────
        let data = prepare_training_data(cfg)?;
        let ckpt = CheckpointManager::new(&cfg.checkpoint_dir);

        // ── Step 5: Frozen encoder (inner backend, never trained) ────────────
        let encoder = build_encoder::<B::InnerBackend>(cfg, &data.tokenizer, &ckpt, &device)?;

        // ── Step 6: Save config for inference ─────────────────────────────────
        ckpt.save_config(cfg)?;

        // ── Step 7: Train ─────────────────────────────────────────────────────
        let metrics = MetricsLogger::new(cfg.metrics_dir())?;
        let engine  = TrainingEngine::<B, _>::new(cfg.engine_config(), &encoder, device.clone())
            .with_checkpoints(ckpt.clone())
            .with_metrics(metrics);

        let member = cfg.model_config();
        if cfg.ensemble_size > 1 {
            tracing::info!("Training an ensemble of {} scorers", cfg.ensemble_size);
            let model = EnsembleConfig::new(member, cfg.ensemble_size).init::<B>(&device)?;
            fit_and_evaluate(&engine, &encoder, model, &data, cfg, &ckpt, &device)
        } else {
            let model = member.init::<B>(&device)?;
            fit_and_evaluate(&engine, &encoder, model, &data, cfg, &ckpt, &device)
        }
    }
}

/// Train, then evaluate `best_model` on the validation split.
/// Falls back to the final weights when the best checkpoint could
/// not be written or read back.
fn fit_and_evaluate<B, M>(
    engine:  &TrainingEngine<'_, B, TransformerEncoder<B::InnerBackend>>,
    encoder: &TransformerEncoder<B::InnerBackend>,
    model:   M,
    data:    &PreparedData,
    cfg:     &TrainConfig,
    ckpt:    &CheckpointManager,
    device:  &B::Device,
) -> Result<TrainReport>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + Scorer<B>,
    M::InnerModule: Scorer<B::InnerBackend>,
{
    let outcome = engine.run(model, Arc::clone(&data.train), Arc::clone(&data.val))?;
    tracing::info!(
        "Training stopped ({:?}) after {} epochs: best val_loss={:.6} at epoch {}, final={:.6}",
        outcome.stop_reason,
        outcome.history.len(),
        outcome.best_val_loss,
        outcome.best_epoch,
        outcome.final_val_loss,
    );

    // ── Step 8: Evaluate the best checkpoint ──────────────────────────────────
    let final_model = outcome.model.valid();
    let best_model  = match ckpt.load_module::<B::InnerBackend, _>(final_model.clone(), BEST_MODEL, device) {
        Ok(m)  => m,
        Err(e) => {
            tracing::warn!("Evaluating final weights instead of best_model: {e:#}");
            final_model
        }
    };
    let evaluation = evaluate::<B::InnerBackend, _, _>(
        &best_model, encoder, &data.val, &cfg.task, cfg.batch_size, device,
    )?;
    write_reports(ckpt.dir(), &evaluation)?;

    Ok(TrainReport {
        epochs_run:     outcome.history.len(),
        best_epoch:     outcome.best_epoch,
        best_val_loss:  outcome.best_val_loss,
        final_val_loss: outcome.final_val_loss,
        stop_reason:    outcome.stop_reason,
        skipped_steps:  outcome.skipped_steps,
        evaluation,
    })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dimension::psych_dimensions;
    use crate::ml::evaluator::EvaluationReport;
    use std::fs;

    #[test]
    fn test_partial_json_takes_defaults() {
        let cfg: TrainConfig = serde_json::from_str(r#"{"epochs": 2, "backend": "ndarray"}"#).unwrap();
        assert_eq!(cfg.epochs, 2);
        assert_eq!(cfg.backend, BackendKind::NdArray);
        assert_eq!(cfg.task, TaskMode::sentiment());
    }

    #[test]
    fn test_regression_needs_one_column_per_dimension() {
        let mut cfg = TrainConfig {
            task: TaskMode::Regression { dimensions: psych_dimensions() },
            ..TrainConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ScorerError::Configuration(_))));
        cfg.label_columns = psych_dimensions().into_iter().map(|d| d.name).collect();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_trial_overrides_searchable_fields_only() {
        let cfg   = TrainConfig::default();
        let trial = TrialConfig { learning_rate: 1.2e-5, weight_decay: 0.02, dropout_rate: 0.12, batch_size: 16 };
        let tuned = cfg.with_trial(&trial);
        assert_eq!(tuned.trial_config(), trial);
        assert_eq!(tuned.hidden_size, cfg.hidden_size);
    }

    #[test]
    fn test_end_to_end_training_on_ndarray() {
        let tmp  = tempfile::tempdir().unwrap();
        let data = tmp.path().join("reviews.csv");
        let mut body = String::from("review,label\n");
        for i in 0..12 {
            body.push_str(&format!("terrible awful product {i},0\n"));
            body.push_str(&format!("it was fine I guess {i},1\n"));
            body.push_str(&format!("wonderful great product {i},2\n"));
        }
        fs::write(&data, body).unwrap();

        let ckpt_dir = tmp.path().join("ckpt");
        let cfg = TrainConfig {
            data_path:      data.to_string_lossy().into_owned(),
            checkpoint_dir: ckpt_dir.to_string_lossy().into_owned(),
            backend:        BackendKind::NdArray,
            max_seq_len:    8,
            vocab_size:     64,
            hidden_size:    16,
            num_heads:      2,
            num_layers:     1,
            d_ff:           32,
            epochs:         2,
            learning_rate:  1e-3,
            num_workers:    1,
            ..TrainConfig::default()
        };

        let report = TrainUseCase::new(cfg.clone()).execute().unwrap();
        assert_eq!(report.epochs_run, 2);
        assert!(report.best_val_loss.is_finite());
        let EvaluationReport::Classification(c) = &report.evaluation.report else {
            panic!("expected a classification report")
        };
        // 12 per class, 80/20 stratified → 2 held out per class
        assert_eq!(c.report.total, 6);

        for file in ["train_config.json", "tokenizer.json", "encoder.mpk.gz", "final_model.mpk.gz",
                     "metrics.csv", "evaluation.json", "error_analysis.csv"] {
            assert!(ckpt_dir.join(file).exists(), "missing {file}");
        }
        let saved: TrainConfig = CheckpointManager::new(&ckpt_dir).load_config().unwrap();
        assert_eq!(saved.task, cfg.task);
        assert_eq!(saved.hidden_size, 16);
        assert_eq!(saved.ensemble_size, 1);
    }
}
