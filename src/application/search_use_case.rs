// ============================================================
// Layer 2 — SearchUseCase
// ============================================================
// Hyperparameter search over short training trials:
//
//   Step 1: Prepare data + frozen encoder once   (shared, read-only)
//   Step 2: Sample every trial config up front   (seeded)
//   Step 3: Run trials, one fresh model each     (1..N workers)
//   Step 4: Log each trial to trials.csv as it lands
//   Step 5: Save best_params.json and a tuned train_config.json
//
// The best trial's model is already on disk as best_model, so a
// finished search can be evaluated or used for prediction directly.
//
// Reference: Bergstra & Bengio (2012) Random Search for
//            Hyper-Parameter Optimization

use anyhow::Result;
use burn::tensor::backend::AutodiffBackend;

use crate::application::{
    prepare::{build_encoder, prepare_training_data},
    train_use_case::TrainConfig,
};
use crate::domain::trial::TrialResult;
use crate::infra::{checkpoint::CheckpointManager, metrics::TrialLogger};
use crate::ml::{
    backend::{dispatch, BackendTask},
    search::{ParamSpace, RandomSampler, SearchController, SearchSummary, TrainingTrialRunner},
    trainer::EngineConfig,
};

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Data, architecture and the base values of every searched field
    pub train:                  TrainConfig,
    pub space:                  ParamSpace,
    pub num_trials:             usize,
    pub workers:                usize,
    pub epochs_per_trial:       usize,
    pub trial_patience:         usize,
    pub trial_time_budget_secs: Option<f64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            train:                  TrainConfig::default(),
            space:                  ParamSpace::default(),
            num_trials:             10,
            workers:                1,
            epochs_per_trial:       3,
            trial_patience:         3,
            trial_time_budget_secs: None,
        }
    }
}

impl SearchConfig {
    /// Engine settings for one trial: a short epoch budget and a fresh
    /// patience counter; the sampled fields are applied per trial.
    pub fn trial_engine(&self) -> EngineConfig {
        EngineConfig {
            max_epochs:       self.epochs_per_trial,
            patience:         self.trial_patience,
            time_budget_secs: self.trial_time_budget_secs,
            ..self.train.engine_config()
        }
    }
}

pub struct SearchUseCase {
    config: SearchConfig,
}

impl SearchUseCase {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub fn execute(self) -> Result<SearchSummary> {
        let backend = self.config.train.backend;
        dispatch(backend, self)
    }
}

impl BackendTask for SearchUseCase {
    type Output = SearchSummary;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> Result<SearchSummary> {
        let cfg   = &self.config;
        let train = &cfg.train;
        train.validate()?;
        cfg.space.validate()?;
        if train.ensemble_size > 1 {
            tracing::warn!("Search trains single scorers; ensemble_size={} is ignored", train.ensemble_size);
        }

        // ── Step 1: Shared data and encoder ───────────────────────────────────
        let data    = prepare_training_data(train)?;
        let ckpt    = CheckpointManager::new(&train.checkpoint_dir);
        let encoder = build_encoder::<B::InnerBackend>(train, &data.tokenizer, &ckpt, &device)?;

        let runner = TrainingTrialRunner::<B, _>::new(
            encoder,
            device,
            train.model_config(),
            cfg.trial_engine(),
            data.train,
            data.val,
        )
        .with_checkpoints(ckpt.clone());

        // ── Steps 2-4: Run the trials ─────────────────────────────────────────
        let controller = SearchController::new(cfg.space.clone(), train.trial_config(), cfg.num_trials)
            .with_workers(cfg.workers);
        let trial_log = TrialLogger::new(train.metrics_dir())?;
        let mut on_trial = |r: &TrialResult| {
            if let Err(e) = trial_log.log(r) {
                tracing::warn!("Could not log trial {}: {e:#}", r.index);
            }
        };
        let mut sampler = RandomSampler::new(train.seed);
        let summary = controller.run_parallel(&mut sampler, &runner, &mut on_trial)?;

        // ── Step 5: Persist the winner ────────────────────────────────────────
        match summary.best_trial() {
            Some(best) => {
                ckpt.save_best_params(&best.params)?;
                let tuned = TrainConfig { ensemble_size: 1, ..train.with_trial(&best.config) };
                ckpt.save_config(&tuned)?;
                tracing::info!(
                    "Search finished: {} of {} trials failed; best params saved to '{}'",
                    summary.failed_count(), summary.trials.len(), ckpt.dir().display(),
                );
            }
            None => tracing::warn!("Every trial failed; no best parameters written"),
        }
        Ok(summary)
    }
}
