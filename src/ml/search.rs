// ============================================================
// Layer 5 — Hyperparameter Search
// ============================================================
// Runs N bounded training trials and keeps the configuration with
// the lowest objective (final validation loss).
//
//   ParamSpace   — declarative: name → distribution + bounds
//   Sampler      — draws one name → value map per trial
//   TrialRunner  — trains one trial, reports a tagged outcome
//   SearchController
//       sequential:  trial 0, 1, 2, … in order
//       workers > 1: scoped thread pool, each worker owns its
//                    runner; results go over an mpsc channel to
//                    ONE collector that appends to the history
//
// Every configuration is sampled up front, so the configs that
// get tried do not depend on the worker count.
//
// Failure policy:
//   Ok(Failed(..)) / recoverable error → penalised, search goes on
//   panic inside a trial (device OOM)  → penalised, search goes on
//   Err(Configuration)                 → the whole search aborts
//
// Best = minimum objective among successful trials, ties → lowest
// trial index, so completion order never changes the answer.

use std::{
    any::Any,
    collections::BTreeMap,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        mpsc, Arc, Mutex,
    },
    thread,
};

use burn::{module::AutodiffModule, tensor::backend::AutodiffBackend};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data::dataset::SentimentDataset;
use crate::domain::{
    error::ScorerError,
    trial::{TrialConfig, TrialOutcome, TrialResult},
};
use crate::infra::checkpoint::{CheckpointManager, BEST_MODEL};
use crate::ml::{
    encoder::TextEncoder,
    model::SentimentModelConfig,
    trainer::{EngineConfig, TrainingEngine},
};

// ─── Parameter Space ─────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Distribution {
    LogUniform { low: f64, high: f64 },
    Uniform    { low: f64, high: f64 },
    /// Inclusive integer range
    IntRange   { low: i64, high: i64 },
    Fixed      { value: f64 },
}

impl Distribution {
    fn validate(&self, name: &str) -> Result<(), ScorerError> {
        let ok = match *self {
            Distribution::LogUniform { low, high } => low > 0.0 && low <= high,
            Distribution::Uniform { low, high }    => low.is_finite() && high.is_finite() && low <= high,
            Distribution::IntRange { low, high }   => low <= high,
            Distribution::Fixed { value }          => value.is_finite(),
        };
        if ok {
            Ok(())
        } else {
            Err(ScorerError::Configuration(format!("invalid range for '{name}': {self:?}")))
        }
    }

    pub fn sample(&self, rng: &mut impl Rng) -> f64 {
        match *self {
            Distribution::LogUniform { low, high } if low < high => {
                rng.gen_range(low.ln()..=high.ln()).exp()
            }
            Distribution::Uniform { low, high } if low < high => rng.gen_range(low..=high),
            Distribution::LogUniform { low, .. } | Distribution::Uniform { low, .. } => low,
            Distribution::IntRange { low, high } => rng.gen_range(low..=high) as f64,
            Distribution::Fixed { value } => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpace {
    params: Vec<(String, Distribution)>,
}

impl ParamSpace {
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    pub fn with(mut self, name: impl Into<String>, dist: Distribution) -> Self {
        self.params.push((name.into(), dist));
        self
    }

    pub fn params(&self) -> &[(String, Distribution)] {
        &self.params
    }

    pub fn validate(&self) -> Result<(), ScorerError> {
        self.params.iter().try_for_each(|(name, d)| d.validate(name))
    }
}

impl Default for ParamSpace {
    /// learning_rate ∈ [1e-5, 2e-5] (log), dropout ∈ [0.1, 0.2],
    /// weight_decay ∈ [0.01, 0.03], batch_size = 8.
    fn default() -> Self {
        Self::new()
            .with("learning_rate", Distribution::LogUniform { low: 1e-5, high: 2e-5 })
            .with("dropout_rate", Distribution::Uniform { low: 0.1, high: 0.2 })
            .with("weight_decay", Distribution::Uniform { low: 0.01, high: 0.03 })
            .with("batch_size", Distribution::Fixed { value: 8.0 })
    }
}

// ─── Sampling ────────────────────────────────────────────────────────────────
pub trait Sampler {
    fn sample(&mut self, space: &ParamSpace) -> BTreeMap<String, f64>;
}

/// Independent draws from each distribution, reproducible from a seed.
pub struct RandomSampler {
    rng: StdRng,
}

impl RandomSampler {
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }
}

impl Sampler for RandomSampler {
    fn sample(&mut self, space: &ParamSpace) -> BTreeMap<String, f64> {
        space
            .params()
            .iter()
            .map(|(name, dist)| (name.clone(), dist.sample(&mut self.rng)))
            .collect()
    }
}

// ─── Trial Runner ────────────────────────────────────────────────────────────
/// Runs one trial. `Ok(Failed)` and recoverable errors are penalised;
/// a Configuration error stops the search.
pub trait TrialRunner {
    fn run_trial(&mut self, trial: usize, config: &TrialConfig) -> Result<TrialOutcome, ScorerError>;
}

/// Run one trial, turning recoverable errors and panics into a
/// penalised `Failed` outcome. burn raises device OOM as a panic.
fn settle<R: TrialRunner>(
    runner: &mut R,
    trial:  usize,
    config: &TrialConfig,
) -> Result<TrialOutcome, ScorerError> {
    match panic::catch_unwind(AssertUnwindSafe(|| runner.run_trial(trial, config))) {
        Ok(Ok(o)) => Ok(o),
        Ok(Err(e)) if e.is_trial_recoverable() => Ok(TrialOutcome::Failed(e.to_string())),
        Ok(Err(e)) => Err(e),
        Err(payload) => Ok(TrialOutcome::Failed(format!("trial panicked: {}", panic_message(&*payload)))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

/// Claim `best` for `(objective, trial)` if it ranks strictly ahead:
/// lower objective first, then lower trial index.
fn claims_best(best: &mut (f64, usize), objective: f64, trial: usize) -> bool {
    let ahead = objective
        .total_cmp(&best.0)
        .then(trial.cmp(&best.1))
        .is_lt();
    if ahead {
        *best = (objective, trial);
    }
    ahead
}

// ─── Controller ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct SearchSummary {
    /// Every trial in index order
    pub trials: Vec<TrialResult>,
    /// Index into `trials` of the best successful trial
    pub best:   Option<usize>,
}

impl SearchSummary {
    pub fn best_trial(&self) -> Option<&TrialResult> {
        self.best.map(|i| &self.trials[i])
    }

    pub fn failed_count(&self) -> usize {
        self.trials.iter().filter(|t| !t.is_ok()).count()
    }
}

/// Lowest objective among successful trials; ties go to the lowest index.
pub fn select_best(trials: &[TrialResult]) -> Option<usize> {
    trials
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_ok())
        .min_by(|(_, a), (_, b)| {
            a.objective_value
                .total_cmp(&b.objective_value)
                .then(a.index.cmp(&b.index))
        })
        .map(|(i, _)| i)
}

pub struct SearchController {
    space:      ParamSpace,
    base:       TrialConfig,
    num_trials: usize,
    workers:    usize,
}

impl SearchController {
    pub fn new(space: ParamSpace, base: TrialConfig, num_trials: usize) -> Self {
        Self { space, base, num_trials, workers: 1 }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    fn plan(&self, sampler: &mut dyn Sampler) -> Vec<(BTreeMap<String, f64>, TrialConfig)> {
        (0..self.num_trials)
            .map(|_| {
                let params = sampler.sample(&self.space);
                let config = TrialConfig::from_sample(&params, &self.base);
                (params, config)
            })
            .collect()
    }

    fn record(
        history:  &mut Vec<TrialResult>,
        on_trial: &mut dyn FnMut(&TrialResult),
        result:   TrialResult,
    ) {
        if result.is_ok() {
            tracing::info!("Trial {} finished: objective={:.6}", result.index, result.objective_value);
        } else {
            tracing::warn!(
                "Trial {} failed: {}",
                result.index,
                result.failure.as_deref().unwrap_or("unknown")
            );
        }
        on_trial(&result);
        history.push(result);
    }

    fn summarize(mut trials: Vec<TrialResult>) -> SearchSummary {
        trials.sort_by_key(|t| t.index);
        let best = select_best(&trials);
        match best.map(|i| &trials[i]) {
            Some(t) => tracing::info!(
                "Best trial {}: objective={:.6} params={:?}", t.index, t.objective_value, t.params
            ),
            None => tracing::warn!("No trial completed successfully"),
        }
        SearchSummary { trials, best }
    }

    /// Run every trial in order on the calling thread.
    pub fn run<R: TrialRunner>(
        &self,
        sampler:  &mut dyn Sampler,
        runner:   &mut R,
        on_trial: &mut dyn FnMut(&TrialResult),
    ) -> Result<SearchSummary, ScorerError> {
        self.space.validate()?;
        let mut history = Vec::with_capacity(self.num_trials);

        for (index, (params, config)) in self.plan(sampler).into_iter().enumerate() {
            tracing::info!("Trial {}/{}: {:?}", index + 1, self.num_trials, params);
            let outcome = settle(runner, index, &config)?;
            Self::record(&mut history, on_trial, TrialResult::from_outcome(index, config, params, outcome));
        }
        Ok(Self::summarize(history))
    }

    /// Run trials on `workers` threads, each with its own clone of
    /// `runner`. Falls back to `run` for a single worker.
    pub fn run_parallel<R: TrialRunner + Clone + Send>(
        &self,
        sampler:  &mut dyn Sampler,
        runner:   &R,
        on_trial: &mut dyn FnMut(&TrialResult),
    ) -> Result<SearchSummary, ScorerError> {
        if self.workers <= 1 {
            return self.run(sampler, &mut runner.clone(), on_trial);
        }
        self.space.validate()?;

        let plan    = Arc::new(self.plan(sampler));
        let next    = AtomicUsize::new(0);
        let abort   = AtomicBool::new(false);
        let (tx, rx) = mpsc::channel::<(usize, Result<TrialOutcome, ScorerError>)>();
        let mut history = Vec::with_capacity(self.num_trials);
        let mut fatal: Option<ScorerError> = None;

        thread::scope(|scope| {
            for _ in 0..self.workers.min(self.num_trials) {
                let tx     = tx.clone();
                let plan   = Arc::clone(&plan);
                let next   = &next;
                let abort  = &abort;
                let mut runner = runner.clone();
                scope.spawn(move || loop {
                    if abort.load(Ordering::SeqCst) {
                        break;
                    }
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some((_, config)) = plan.get(index) else { break };
                    let outcome = settle(&mut runner, index, config);
                    if outcome.is_err() {
                        abort.store(true, Ordering::SeqCst);
                    }
                    if tx.send((index, outcome)).is_err() {
                        break;
                    }
                });
            }
            // Only worker clones keep the channel open
            drop(tx);

            // ── Single writer: the collector owns the history ──
            for (index, outcome) in rx {
                match outcome {
                    Ok(outcome) => {
                        let (params, config) = plan[index].clone();
                        Self::record(
                            &mut history, on_trial,
                            TrialResult::from_outcome(index, config, params, outcome),
                        );
                    }
                    Err(e) => {
                        tracing::error!("Trial {} aborted the search: {}", index, e);
                        fatal.get_or_insert(e);
                    }
                }
            }
        });

        match fatal {
            Some(e) => Err(e),
            None    => Ok(Self::summarize(history)),
        }
    }
}

// ─── Production Runner ───────────────────────────────────────────────────────
/// Trains a fresh model per trial on shared, read-only datasets.
/// The trial model is dropped before returning unless it beats every
/// earlier trial, in which case it is saved as `best_model`.
pub struct TrainingTrialRunner<B: AutodiffBackend, E> {
    encoder:     E,
    device:      B::Device,
    model:       SentimentModelConfig,
    engine:      EngineConfig,
    train_set:   Arc<SentimentDataset>,
    val_set:     Arc<SentimentDataset>,
    checkpoints: Option<CheckpointManager>,
    best_so_far: Arc<Mutex<(f64, usize)>>,
}

impl<B: AutodiffBackend, E: Clone> Clone for TrainingTrialRunner<B, E> {
    fn clone(&self) -> Self {
        Self {
            encoder:     self.encoder.clone(),
            device:      self.device.clone(),
            model:       self.model.clone(),
            engine:      self.engine.clone(),
            train_set:   Arc::clone(&self.train_set),
            val_set:     Arc::clone(&self.val_set),
            checkpoints: self.checkpoints.clone(),
            best_so_far: Arc::clone(&self.best_so_far),
        }
    }
}

impl<B, E> TrainingTrialRunner<B, E>
where
    B: AutodiffBackend,
    E: TextEncoder<B::InnerBackend>,
{
    pub fn new(
        encoder:   E,
        device:    B::Device,
        model:     SentimentModelConfig,
        engine:    EngineConfig,
        train_set: Arc<SentimentDataset>,
        val_set:   Arc<SentimentDataset>,
    ) -> Self {
        Self {
            encoder, device, model, engine, train_set, val_set,
            checkpoints: None,
            best_so_far: Arc::new(Mutex::new((f64::INFINITY, usize::MAX))),
        }
    }

    pub fn with_checkpoints(mut self, checkpoints: CheckpointManager) -> Self {
        self.checkpoints = Some(checkpoints);
        self
    }

    fn persist_if_best<M>(&self, trial: usize, objective: f64, model: &M)
    where
        M: AutodiffModule<B>,
    {
        let Some(ckpt) = &self.checkpoints else { return };
        let Ok(mut best) = self.best_so_far.lock() else {
            tracing::warn!("Best-trial lock poisoned; trial {} model not saved", trial);
            return;
        };
        if claims_best(&mut best, objective, trial) {
            match ckpt.save_module::<B::InnerBackend, _>(&model.valid(), BEST_MODEL) {
                Ok(())  => tracing::info!("Trial {} is the best so far; model saved", trial),
                Err(e)  => tracing::warn!("Could not save trial {} model: {e:#}", trial),
            }
        }
    }
}

impl<B, E> TrialRunner for TrainingTrialRunner<B, E>
where
    B: AutodiffBackend,
    E: TextEncoder<B::InnerBackend>,
{
    fn run_trial(&mut self, trial: usize, config: &TrialConfig) -> Result<TrialOutcome, ScorerError> {
        let engine_cfg = EngineConfig {
            learning_rate: config.learning_rate,
            weight_decay:  config.weight_decay,
            batch_size:    config.batch_size,
            seed:          self.engine.seed.wrapping_add(trial as u64),
            ..self.engine.clone()
        };
        let model = self
            .model
            .clone()
            .with_dropout(config.dropout_rate)
            .init::<B>(&self.device)?;

        let engine  = TrainingEngine::<B, E>::new(engine_cfg, &self.encoder, self.device.clone());
        let outcome = engine.run(model, Arc::clone(&self.train_set), Arc::clone(&self.val_set))?;

        self.persist_if_best(trial, outcome.final_val_loss, &outcome.model);
        Ok(TrialOutcome::Completed(outcome.final_val_loss))
        // outcome.model is dropped here, releasing the trial's parameters
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trial::FAILED_TRIAL_OBJECTIVE;

    /// Replays a fixed list of outcomes, one per trial index.
    #[derive(Clone)]
    struct ScriptedRunner {
        script: Vec<Result<TrialOutcome, ScorerError>>,
    }

    impl TrialRunner for ScriptedRunner {
        fn run_trial(&mut self, trial: usize, _: &TrialConfig) -> Result<TrialOutcome, ScorerError> {
            self.script[trial].clone()
        }
    }

    /// Panics on one trial index, the way burn reports device OOM.
    #[derive(Clone)]
    struct PanickingRunner {
        panic_on: usize,
        inner:    ScriptedRunner,
    }

    impl TrialRunner for PanickingRunner {
        fn run_trial(&mut self, trial: usize, config: &TrialConfig) -> Result<TrialOutcome, ScorerError> {
            if trial == self.panic_on {
                panic!("simulated device out of memory");
            }
            self.inner.run_trial(trial, config)
        }
    }

    fn scripted_ok() -> ScriptedRunner {
        ScriptedRunner {
            script: vec![
                Ok(TrialOutcome::Completed(0.5)),
                Ok(TrialOutcome::Completed(0.6)),
                Ok(TrialOutcome::Completed(0.3)),
            ],
        }
    }

    fn lr_space() -> ParamSpace {
        ParamSpace::new().with("learning_rate", Distribution::LogUniform { low: 1e-5, high: 1e-3 })
    }

    fn scripted() -> ScriptedRunner {
        ScriptedRunner {
            script: vec![
                Ok(TrialOutcome::Completed(0.5)),
                Err(ScorerError::NumericalFailure("loss is NaN".into())),
                Ok(TrialOutcome::Completed(0.3)),
            ],
        }
    }

    #[test]
    fn test_failed_middle_trial_does_not_hide_best() {
        let controller = SearchController::new(lr_space(), TrialConfig::default(), 3);
        let mut seen = 0;
        let summary = controller
            .run(&mut RandomSampler::new(7), &mut scripted(), &mut |_| seen += 1)
            .unwrap();

        assert_eq!(seen, 3);
        assert_eq!(summary.failed_count(), 1);
        assert_eq!(summary.trials[1].objective_value, FAILED_TRIAL_OBJECTIVE);
        let best = summary.best_trial().unwrap();
        assert_eq!(best.index, 2);
        assert_eq!(best.config, summary.trials[2].config);
    }

    #[test]
    fn test_parallel_search_selects_same_best() {
        let controller = SearchController::new(lr_space(), TrialConfig::default(), 3).with_workers(3);
        let summary = controller
            .run_parallel(&mut RandomSampler::new(7), &scripted(), &mut |_| {})
            .unwrap();
        assert_eq!(summary.trials.len(), 3);
        assert_eq!(summary.best_trial().unwrap().index, 2);

        let sequential = SearchController::new(lr_space(), TrialConfig::default(), 3)
            .run(&mut RandomSampler::new(7), &mut scripted(), &mut |_| {})
            .unwrap();
        assert_eq!(summary.trials, sequential.trials);
    }

    #[test]
    fn test_configuration_error_aborts_search() {
        let mut runner = ScriptedRunner {
            script: vec![
                Ok(TrialOutcome::Completed(0.5)),
                Err(ScorerError::Configuration("heads".into())),
                Ok(TrialOutcome::Completed(0.3)),
            ],
        };
        let controller = SearchController::new(lr_space(), TrialConfig::default(), 3);
        let err = controller
            .run(&mut RandomSampler::new(1), &mut runner, &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, ScorerError::Configuration(_)));
    }

    #[test]
    fn test_ties_go_to_earliest_trial() {
        let mut runner = ScriptedRunner {
            script: vec![Ok(TrialOutcome::Completed(0.4)), Ok(TrialOutcome::Completed(0.4))],
        };
        let summary = SearchController::new(lr_space(), TrialConfig::default(), 2)
            .run(&mut RandomSampler::new(3), &mut runner, &mut |_| {})
            .unwrap();
        assert_eq!(summary.best_trial().unwrap().index, 0);
    }

    #[test]
    fn test_samples_stay_inside_bounds() {
        let space = ParamSpace::default().with("layers", Distribution::IntRange { low: 2, high: 4 });
        let mut sampler = RandomSampler::new(11);
        for _ in 0..200 {
            let s = sampler.sample(&space);
            assert!((1e-5..=2e-5).contains(&s["learning_rate"]));
            assert!((0.1..=0.2).contains(&s["dropout_rate"]));
            assert!((0.01..=0.03).contains(&s["weight_decay"]));
            assert_eq!(s["batch_size"], 8.0);
            assert!([2.0, 3.0, 4.0].contains(&s["layers"]));
        }
    }

    #[test]
    fn test_invalid_space_is_rejected() {
        let space = ParamSpace::new().with("learning_rate", Distribution::LogUniform { low: 0.0, high: 1.0 });
        assert!(space.validate().is_err());
    }

    #[test]
    fn test_panicking_trial_is_penalised_not_fatal() {
        let mut runner = PanickingRunner { panic_on: 1, inner: scripted_ok() };
        let summary = SearchController::new(lr_space(), TrialConfig::default(), 3)
            .run(&mut RandomSampler::new(5), &mut runner, &mut |_| {})
            .unwrap();
        assert_eq!(summary.failed_count(), 1);
        assert_eq!(summary.trials[1].objective_value, FAILED_TRIAL_OBJECTIVE);
        assert!(summary.trials[1].failure.as_deref().unwrap_or("").contains("out of memory"));
        assert_eq!(summary.best_trial().unwrap().index, 2);
    }

    #[test]
    fn test_panicking_trial_in_parallel_search() {
        let runner = PanickingRunner { panic_on: 0, inner: scripted_ok() };
        let summary = SearchController::new(lr_space(), TrialConfig::default(), 3)
            .with_workers(2)
            .run_parallel(&mut RandomSampler::new(5), &runner, &mut |_| {})
            .unwrap();
        assert_eq!(summary.trials.len(), 3);
        assert!(!summary.trials[0].is_ok());
        assert_eq!(summary.best_trial().unwrap().index, 2);
    }

    #[test]
    fn test_best_claim_prefers_lower_index_on_tie() {
        let mut best = (f64::INFINITY, usize::MAX);
        assert!(claims_best(&mut best, 0.4, 3));
        // Trial 1 ties but finished later: still the rightful best
        assert!(claims_best(&mut best, 0.4, 1));
        assert_eq!(best, (0.4, 1));
        assert!(!claims_best(&mut best, 0.4, 2));
        assert!(!claims_best(&mut best, f64::NAN, 0));
        assert!(claims_best(&mut best, 0.2, 5));
        assert_eq!(best, (0.2, 5));
    }

    #[test]
    fn test_all_failed_trials_yield_no_best() {
        let mut runner = ScriptedRunner { script: vec![Ok(TrialOutcome::Failed("oom".into()))] };
        let summary = SearchController::new(lr_space(), TrialConfig::default(), 1)
            .run(&mut RandomSampler::new(0), &mut runner, &mut |_| {})
            .unwrap();
        assert!(summary.best_trial().is_none());
    }
}
