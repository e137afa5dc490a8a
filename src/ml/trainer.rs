// ============================================================
// Layer 5 — Training Engine
// ============================================================
// Fits a scorer on top of the frozen encoder. One engine run is a
// small state machine:
//
//   Init → (TrainEpoch → ValidateEpoch)* → Stopped
//
// TrainEpoch, per batch:
//   1. encoder.embed(ids)  (+ uniform noise in [-ε, ε] when enabled)
//   2. encoder.contextualize → [CLS] summary, moved onto autodiff
//   3. scorer.score → loss (NLL or weighted MSE)
//   4. backward(loss · scale / accumulation_steps), accumulate
//   5. every `accumulation_steps` batches (and at epoch end):
//        unscale → finite check → clip global norm → AdamW step
//
// ValidateEpoch: model.valid() on the inner backend, no gradients,
// no dropout. Sample-weighted mean loss feeds early stopping and the
// best checkpoint.
//
// Key Burn insights:
//   - Training uses Autodiff<B>; model.valid() returns the model on
//     B::InnerBackend, so the validation batcher uses that backend
//   - The encoder lives on the inner backend: it never produces
//     gradients, and Tensor::from_inner hands its output to the
//     trainable scorer
//
// Reference: Burn Book §5 (Custom Training Loops)
//            Loshchilov & Hutter (2019) Decoupled Weight Decay (AdamW)

use std::{sync::Arc, time::Instant};

use burn::{
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    module::AutodiffModule,
    optim::{AdamWConfig, GradientsAccumulator, GradientsParams, Optimizer},
    prelude::*,
    tensor::{backend::AutodiffBackend, Distribution},
};
use serde::{Deserialize, Serialize};

use crate::data::{
    batcher::{SentimentBatch, SentimentBatcher},
    dataset::SentimentDataset,
};
use crate::domain::error::ScorerError;
use crate::infra::{
    checkpoint::{CheckpointManager, BEST_MODEL, FINAL_MODEL},
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::{
    early_stopping::{EarlyStoppingMonitor, Observation},
    encoder::TextEncoder,
    gradients::{clip_grad_norm, global_grad_norm, scale_grads},
    model::{scoring_loss, OutputMode, Scorer},
    precision::{LossScaler, ScaleDecision},
    schedule::{total_optimizer_steps, LinearWarmupSchedule},
};

// ─── Engine Configuration ────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub max_epochs:          usize,
    pub batch_size:          usize,
    pub learning_rate:       f64,
    pub weight_decay:        f64,
    pub warmup_ratio:        f64,
    pub max_grad_norm:       f64,
    pub accumulation_steps:  usize,
    pub mixed_precision:     bool,
    /// Bound of the uniform embedding noise; 0 disables it
    pub adversarial_epsilon: f64,
    pub patience:            usize,
    pub min_delta:           f64,
    pub seed:                u64,
    pub num_workers:         usize,
    /// Wall-clock budget, checked at epoch boundaries
    pub time_budget_secs:    Option<f64>,
    /// Per-dimension loss weights (regression only)
    pub dim_weights:         Option<Vec<f32>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_epochs:          10,
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
            seed:                42,
            num_workers:         1,
            time_budget_secs:    None,
            dim_weights:         None,
        }
    }
}

impl EngineConfig {
    fn validate(&self) -> Result<(), ScorerError> {
        if self.max_epochs == 0 || self.batch_size == 0 || self.accumulation_steps == 0 {
            return Err(ScorerError::Configuration(
                "epochs, batch size and accumulation steps must all be at least 1".into(),
            ));
        }
        if !(self.max_grad_norm > 0.0) {
            return Err(ScorerError::Configuration(format!(
                "max_grad_norm must be positive, got {}", self.max_grad_norm
            )));
        }
        Ok(())
    }
}

// ─── Outcome ─────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Ran every configured epoch
    EpochBudget,
    /// Patience ran out first
    EarlyStopping,
}

#[derive(Debug)]
pub struct TrainingOutcome<M> {
    /// The model as it stands after the last epoch
    pub model:                 M,
    pub history:               Vec<EpochMetrics>,
    pub best_val_loss:         f64,
    pub best_epoch:            usize,
    pub final_val_loss:        f64,
    pub stop_reason:           StopReason,
    /// Optimizer steps dropped by the loss scaler on overflow
    pub skipped_steps:         usize,
    /// Optimizer steps actually applied
    pub optimizer_steps:       usize,
    /// Applied steps whose gradients had to be clipped
    pub clipped_steps:         usize,
    /// Largest global gradient norm handed to the optimizer
    pub max_applied_grad_norm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Init,
    TrainEpoch(usize),
    ValidateEpoch(usize),
    Stopped(StopReason),
}

/// Mutable bookkeeping owned by one run.
struct StepState {
    scaler:        LossScaler,
    schedule:      LinearWarmupSchedule,
    step:          usize,
    skipped_steps: usize,
    clipped_steps: usize,
    max_applied:   f64,
    last_lr:       f64,
}

// ─── TrainingEngine ──────────────────────────────────────────────────────────
pub struct TrainingEngine<'a, B: AutodiffBackend, E> {
    config:      EngineConfig,
    encoder:     &'a E,
    device:      B::Device,
    checkpoints: Option<CheckpointManager>,
    metrics:     Option<MetricsLogger>,
}

impl<'a, B, E> TrainingEngine<'a, B, E>
where
    B: AutodiffBackend,
    E: TextEncoder<B::InnerBackend>,
{
    pub fn new(config: EngineConfig, encoder: &'a E, device: B::Device) -> Self {
        Self { config, encoder, device, checkpoints: None, metrics: None }
    }

    /// Persist `best_model` / `final_model` under this manager.
    pub fn with_checkpoints(mut self, checkpoints: CheckpointManager) -> Self {
        self.checkpoints = Some(checkpoints);
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsLogger) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Train `model` until the epoch budget or patience runs out.
    pub fn run<M>(
        &self,
        mut model: M,
        train_set: Arc<SentimentDataset>,
        val_set:   Arc<SentimentDataset>,
    ) -> Result<TrainingOutcome<M>, ScorerError>
    where
        M: AutodiffModule<B> + Scorer<B>,
        M::InnerModule: Scorer<B::InnerBackend>,
    {
        let cfg = &self.config;
        let started = Instant::now();

        // ── Init ──────────────────────────────────────────────────────────────
        let mut state = EngineState::Init;
        cfg.validate()?;
        if train_set.len() == 0 || val_set.len() == 0 {
            return Err(ScorerError::Data(format!(
                "cannot train with {} training and {} validation examples",
                train_set.len(), val_set.len()
            )));
        }

        let batches_per_epoch = train_set.len().div_ceil(cfg.batch_size);
        let total_steps = total_optimizer_steps(batches_per_epoch, cfg.accumulation_steps, cfg.max_epochs);
        let mut steps = StepState {
            scaler:        LossScaler::new(cfg.mixed_precision),
            schedule:      LinearWarmupSchedule::new(cfg.learning_rate, cfg.warmup_ratio, total_steps),
            step:          0,
            skipped_steps: 0,
            clipped_steps: 0,
            max_applied:   0.0,
            last_lr:       0.0,
        };
        if steps.scaler.is_enabled() {
            tracing::info!("Dynamic loss scaling on, initial scale {}", steps.scaler.scale());
        }

        let mut optim = AdamWConfig::new()
            .with_weight_decay(cfg.weight_decay as f32)
            .init::<B, M>();
        let mut monitor = EarlyStoppingMonitor::new(cfg.patience, cfg.min_delta);

        let train_loader = DataLoaderBuilder::new(SentimentBatcher::<B>::new(self.device.clone()))
            .batch_size(cfg.batch_size)
            .shuffle(cfg.seed)
            .num_workers(cfg.num_workers.max(1))
            .build(train_set);

        let val_loader = DataLoaderBuilder::new(SentimentBatcher::<B::InnerBackend>::new(self.device.clone()))
            .batch_size(cfg.batch_size)
            .num_workers(cfg.num_workers.max(1))
            .build(val_set);

        let mut history: Vec<EpochMetrics> = Vec::new();
        let mut best_epoch     = 0usize;
        let mut final_val_loss = f64::NAN;
        let mut train_loss     = f64::NAN;
        let mut epoch_started  = Instant::now();

        // ── State machine ─────────────────────────────────────────────────────
        let stop_reason = loop {
            state = match state {
                EngineState::Init => {
                    tracing::info!(
                        "Training: {} batches/epoch, {} optimizer steps, warm-up {} steps",
                        batches_per_epoch, total_steps, steps.schedule.warmup_steps()
                    );
                    EngineState::TrainEpoch(1)
                }

                EngineState::TrainEpoch(epoch) => {
                    epoch_started = Instant::now();
                    let (next, mean) = self.train_epoch(
                        model, &mut optim, train_loader.as_ref(), batches_per_epoch, &mut steps,
                    )?;
                    model      = next;
                    train_loss = mean;
                    EngineState::ValidateEpoch(epoch)
                }

                EngineState::ValidateEpoch(epoch) => {
                    let valid    = model.valid();
                    let val_loss = self.validate_epoch(&valid, val_loader.as_ref())?;
                    final_val_loss = val_loss;

                    let observation = monitor.observe(val_loss);
                    let improved    = observation == Observation::Improved;
                    if improved {
                        best_epoch = epoch;
                        self.save_checkpoint(&valid, BEST_MODEL);
                    }

                    let metrics = EpochMetrics {
                        epoch,
                        train_loss,
                        val_loss,
                        learning_rate: steps.last_lr,
                        duration_secs: epoch_started.elapsed().as_secs_f64(),
                        improved,
                    };
                    tracing::info!(
                        "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | lr={:.2e}{}",
                        epoch, cfg.max_epochs, train_loss, val_loss, steps.last_lr,
                        if improved { " | best" } else { "" },
                    );
                    if let Some(logger) = &self.metrics {
                        if let Err(e) = logger.log(&metrics) {
                            tracing::warn!("Could not write epoch metrics: {e:#}");
                        }
                    }
                    history.push(metrics);

                    if let Some(budget) = cfg.time_budget_secs {
                        let elapsed = started.elapsed().as_secs_f64();
                        if elapsed > budget {
                            return Err(ScorerError::BudgetExceeded(format!(
                                "{elapsed:.1}s elapsed after epoch {epoch}, budget {budget:.1}s"
                            )));
                        }
                    }

                    if observation == Observation::Stop {
                        tracing::info!(
                            "Early stopping after epoch {}: no improvement for {} evaluations",
                            epoch, monitor.state().stale_count
                        );
                        EngineState::Stopped(StopReason::EarlyStopping)
                    } else if epoch >= cfg.max_epochs {
                        EngineState::Stopped(StopReason::EpochBudget)
                    } else {
                        EngineState::TrainEpoch(epoch + 1)
                    }
                }

                EngineState::Stopped(reason) => break reason,
            };
        };

        self.save_checkpoint(&model.valid(), FINAL_MODEL);

        Ok(TrainingOutcome {
            model,
            history,
            best_val_loss: monitor.best_loss().unwrap_or(f64::NAN),
            best_epoch,
            final_val_loss,
            stop_reason,
            skipped_steps:         steps.skipped_steps,
            optimizer_steps:       steps.step,
            clipped_steps:         steps.clipped_steps,
            max_applied_grad_norm: steps.max_applied,
        })
    }

    /// [CLS] summary for a training batch, with optional embedding noise.
    fn train_summary(&self, batch: &SentimentBatch<B>) -> Tensor<B, 2> {
        let mut embeddings = self.encoder.embed(batch.token_ids.clone().inner());
        let eps = self.config.adversarial_epsilon;
        if eps > 0.0 {
            let noise = Tensor::random(
                embeddings.shape(),
                Distribution::Uniform(-eps, eps),
                &embeddings.device(),
            );
            embeddings = embeddings + noise;
        }
        let hidden = self.encoder.contextualize(embeddings, batch.pad_mask().inner());
        Tensor::from_inner(self.encoder.summarize(hidden))
    }

    fn train_epoch<M, O>(
        &self,
        mut model:         M,
        optim:             &mut O,
        loader:            &dyn DataLoader<SentimentBatch<B>>,
        batches_per_epoch: usize,
        steps:             &mut StepState,
    ) -> Result<(M, f64), ScorerError>
    where
        M: AutodiffModule<B> + Scorer<B>,
        O: Optimizer<M, B>,
    {
        let cfg   = &self.config;
        let accum = cfg.accumulation_steps;
        let mut accumulator = GradientsAccumulator::<M>::new();
        let mut pending     = 0usize;
        let mut loss_sum    = 0.0f64;
        let mut seen        = 0usize;

        for (index, batch) in loader.iter().enumerate() {
            let outputs = model.score(self.train_summary(&batch));
            let loss = scoring_loss(
                model.output_mode(), outputs, &batch.targets, cfg.dim_weights.as_deref(),
            )?;

            let loss_value: f64 = loss.clone().into_scalar().elem::<f64>();
            if !loss_value.is_finite() {
                return Err(ScorerError::NumericalFailure(format!(
                    "training loss became {loss_value} at batch {index}"
                )));
            }
            loss_sum += loss_value * batch.len() as f64;
            seen     += batch.len();

            // Scale for accumulation and for the loss scaler in one multiply
            let scaled = loss.mul_scalar(steps.scaler.scale() / accum as f64);
            let grads  = GradientsParams::from_grads(scaled.backward(), &model);
            accumulator.accumulate(&model, grads);
            pending += 1;

            let last_batch = index + 1 == batches_per_epoch;
            if pending == accum || last_batch {
                let grads = accumulator.grads();
                pending = 0;
                model = self.optimizer_step(model, optim, grads, steps)?;
            }
        }

        Ok((model, loss_sum / seen.max(1) as f64))
    }

    /// Unscale → finite check → clip → step. Clipping is never skipped
    /// for a step that is applied.
    fn optimizer_step<M, O>(
        &self,
        model:     M,
        optim:     &mut O,
        mut grads: GradientsParams,
        steps:     &mut StepState,
    ) -> Result<M, ScorerError>
    where
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        scale_grads::<B, M>(&model, &mut grads, steps.scaler.inverse());

        let finite = global_grad_norm::<B, M>(&model, &grads).is_finite();
        if steps.scaler.update(finite) == ScaleDecision::Skip {
            steps.skipped_steps += 1;
            tracing::debug!("Skipping step {}: non-finite gradients", steps.step);
            return Ok(model);
        }
        if !finite {
            return Err(ScorerError::NumericalFailure(format!(
                "non-finite gradient norm at optimizer step {}", steps.step
            )));
        }

        let clip = clip_grad_norm::<B, M>(&model, &mut grads, self.config.max_grad_norm);
        if clip.clipped {
            steps.clipped_steps += 1;
            tracing::debug!("Clipped gradient norm {:.3} → {:.3}", clip.norm_before, clip.norm_after);
        }
        let applied = global_grad_norm::<B, M>(&model, &grads);
        steps.max_applied = steps.max_applied.max(applied);

        let lr = steps.schedule.lr_at(steps.step);
        steps.step   += 1;
        steps.last_lr = lr;
        Ok(optim.step(lr, model, grads))
    }

    fn validate_epoch<S>(
        &self,
        model:  &S,
        loader: &dyn DataLoader<SentimentBatch<B::InnerBackend>>,
    ) -> Result<f64, ScorerError>
    where
        S: Scorer<B::InnerBackend>,
    {
        mean_loss(model, self.encoder, loader, self.config.dim_weights.as_deref())
    }

    fn save_checkpoint<S: Module<B::InnerBackend>>(&self, model: &S, name: &str) {
        if let Some(ckpt) = &self.checkpoints {
            match ckpt.save_module::<B::InnerBackend, S>(model, name) {
                Ok(())  => tracing::debug!("Checkpoint '{}' saved", name),
                Err(e)  => tracing::warn!(
                    "{}", ScorerError::CheckpointIo(format!("{name}: {e:#}"))
                ),
            }
        }
    }
}

/// Sample-weighted mean loss of `model` over every batch of `loader`.
pub fn mean_loss<B, S, E>(
    model:       &S,
    encoder:     &E,
    loader:      &dyn DataLoader<SentimentBatch<B>>,
    dim_weights: Option<&[f32]>,
) -> Result<f64, ScorerError>
where
    B: Backend,
    S: Scorer<B>,
    E: TextEncoder<B>,
{
    let mode: OutputMode = model.output_mode();
    let mut loss_sum = 0.0f64;
    let mut seen     = 0usize;
    for batch in loader.iter() {
        let summary = encoder.encode(batch.token_ids.clone(), batch.pad_mask());
        let loss    = scoring_loss(mode, model.score(summary), &batch.targets, dim_weights)?;
        loss_sum += loss.into_scalar().elem::<f64>() * batch.len() as f64;
        seen     += batch.len();
    }
    let mean = loss_sum / seen.max(1) as f64;
    if !mean.is_finite() {
        return Err(ScorerError::NumericalFailure(format!("validation loss is {mean}")));
    }
    Ok(mean)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::{SentimentItem, Target};
    use crate::ml::encoder::{TransformerEncoder, TransformerEncoderConfig};
    use crate::ml::model::{SentimentModel, SentimentModelConfig};
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;
    type Inner       = NdArray;

    const SEQ: usize = 6;

    fn item(first_token: u32, class: usize) -> SentimentItem {
        let mut ids = vec![101, first_token, first_token + 1, 102, 0, 0];
        ids.truncate(SEQ);
        SentimentItem {
            text:           format!("text {first_token}"),
            input_ids:      ids,
            attention_mask: vec![1, 1, 1, 1, 0, 0],
            target:         Target::Class(class),
        }
    }

    fn dataset(n: usize) -> Arc<SentimentDataset> {
        Arc::new(SentimentDataset::new(
            (0..n).map(|i| item(110 + (i % 5) as u32, i % 2)).collect(),
        ))
    }

    fn encoder() -> TransformerEncoder<Inner> {
        TransformerEncoderConfig::new(120, SEQ, 8, 2, 1, 16)
            .init(&Default::default())
            .unwrap()
    }

    fn model() -> SentimentModel<TestBackend> {
        SentimentModelConfig::new(8, 2, OutputMode::LogSoftmax)
            .init(&Default::default())
            .unwrap()
    }

    fn quick_config() -> EngineConfig {
        EngineConfig {
            max_epochs:  2,
            batch_size:  4,
            learning_rate: 1e-3,
            num_workers: 1,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_run_records_history_and_checkpoints() {
        let tmp  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path());
        let enc  = encoder();
        let engine = TrainingEngine::<TestBackend, _>::new(
            EngineConfig { accumulation_steps: 2, adversarial_epsilon: 0.01, ..quick_config() },
            &enc,
            Default::default(),
        )
        .with_checkpoints(ckpt.clone())
        .with_metrics(MetricsLogger::new(tmp.path()).unwrap());

        let outcome = engine.run(model(), dataset(10), dataset(4)).unwrap();
        assert_eq!(outcome.history.len(), 2);
        assert!(outcome.final_val_loss.is_finite());
        assert!(outcome.best_val_loss <= outcome.final_val_loss);
        assert!(ckpt.has_weights(BEST_MODEL));
        assert!(ckpt.has_weights(FINAL_MODEL));
        assert!(tmp.path().join("metrics.csv").exists());
    }

    #[test]
    fn test_accumulation_steps_once_per_group_and_at_epoch_end() {
        let enc = encoder();
        // 10 items / batch 4 → 3 batches; groups of 2 → steps after batch 2 and 3
        let accumulated = TrainingEngine::<TestBackend, _>::new(
            EngineConfig { accumulation_steps: 2, patience: 5, ..quick_config() },
            &enc,
            Default::default(),
        )
        .run(model(), dataset(10), dataset(4))
        .unwrap();
        assert_eq!(accumulated.history.len(), 2);
        assert_eq!(accumulated.optimizer_steps, total_optimizer_steps(3, 2, 2));
        assert_eq!(accumulated.optimizer_steps, 4);

        let every_batch = TrainingEngine::<TestBackend, _>::new(
            EngineConfig { patience: 5, ..quick_config() },
            &enc,
            Default::default(),
        )
        .run(model(), dataset(10), dataset(4))
        .unwrap();
        assert_eq!(every_batch.optimizer_steps, 6);
    }

    #[test]
    fn test_every_applied_step_is_clipped_to_max_norm() {
        let enc = encoder();
        let max_grad_norm = 1e-4;
        let outcome = TrainingEngine::<TestBackend, _>::new(
            EngineConfig { learning_rate: 0.05, max_grad_norm, max_epochs: 1, ..quick_config() },
            &enc,
            Default::default(),
        )
        .run(model(), dataset(12), dataset(4))
        .unwrap();
        assert_eq!(outcome.optimizer_steps, 3);
        assert_eq!(outcome.clipped_steps, outcome.optimizer_steps);
        assert!(outcome.max_applied_grad_norm > 0.0);
        assert!(
            outcome.max_applied_grad_norm <= max_grad_norm * 1.001,
            "applied norm {} above {max_grad_norm}", outcome.max_applied_grad_norm
        );
    }

    #[test]
    fn test_flat_validation_loss_triggers_early_stop() {
        let enc = encoder();
        // lr = 0 leaves the model untouched, so every val loss is identical
        let engine = TrainingEngine::<TestBackend, _>::new(
            EngineConfig { max_epochs: 5, learning_rate: 0.0, patience: 1, ..quick_config() },
            &enc,
            Default::default(),
        );
        let outcome = engine.run(model(), dataset(8), dataset(4)).unwrap();
        assert_eq!(outcome.stop_reason, StopReason::EarlyStopping);
        assert_eq!(outcome.history.len(), 2);
        assert_eq!(outcome.best_epoch, 1);
    }

    #[test]
    fn test_loss_scaling_trains_without_skips() {
        let enc = encoder();
        let engine = TrainingEngine::<TestBackend, _>::new(
            EngineConfig { mixed_precision: true, max_epochs: 1, ..quick_config() },
            &enc,
            Default::default(),
        );
        let outcome = engine.run(model(), dataset(8), dataset(4)).unwrap();
        assert_eq!(outcome.skipped_steps, 0);
        assert_eq!(outcome.stop_reason, StopReason::EpochBudget);
    }

    #[test]
    fn test_time_budget_is_enforced_at_epoch_boundary() {
        let enc = encoder();
        let engine = TrainingEngine::<TestBackend, _>::new(
            EngineConfig { time_budget_secs: Some(0.0), ..quick_config() },
            &enc,
            Default::default(),
        );
        let err = engine.run(model(), dataset(8), dataset(4)).unwrap_err();
        assert!(matches!(err, ScorerError::BudgetExceeded(_)));
    }

    #[test]
    fn test_empty_training_split_is_a_data_error() {
        let enc = encoder();
        let engine = TrainingEngine::<TestBackend, _>::new(quick_config(), &enc, Default::default());
        let err = engine
            .run(model(), Arc::new(SentimentDataset::default()), dataset(4))
            .unwrap_err();
        assert!(matches!(err, ScorerError::Data(_)));
    }
}
