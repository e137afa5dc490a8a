// ============================================================
// Layer 3 — Trial Types
// ============================================================
// A trial is one bounded training run under one sampled
// hyperparameter configuration.
//
//   TrialConfig  — sampled once, immutable afterwards
//   TrialOutcome — what the runner reports (tagged, no panics)
//   TrialResult  — the record appended to the search history
//
// Failed trials are kept in the history with a sentinel objective
// so they can never be selected as best.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Objective assigned to a failed or abandoned trial.
pub const FAILED_TRIAL_OBJECTIVE: f64 = 1e6;

/// The hyperparameters one trial trains with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialConfig {
    pub learning_rate: f64,
    pub weight_decay:  f64,
    pub dropout_rate:  f64,
    pub batch_size:    usize,
}

impl TrialConfig {
    /// Build a config from a sampled name → value map.
    /// Names absent from the sample keep the value in `base`.
    pub fn from_sample(sample: &BTreeMap<String, f64>, base: &TrialConfig) -> Self {
        let get = |name: &str, fallback: f64| sample.get(name).copied().unwrap_or(fallback);
        Self {
            learning_rate: get("learning_rate", base.learning_rate),
            weight_decay:  get("weight_decay", base.weight_decay),
            dropout_rate:  get("dropout_rate", base.dropout_rate),
            batch_size:    get("batch_size", base.batch_size as f64).round().max(1.0) as usize,
        }
    }
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1.7e-5,
            weight_decay:  0.0117,
            dropout_rate:  0.15,
            batch_size:    8,
        }
    }
}

/// What a trial runner reports back to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum TrialOutcome {
    Completed(f64),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Ok,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub index:           usize,
    pub config:          TrialConfig,
    pub params:          BTreeMap<String, f64>,
    pub objective_value: f64,
    pub status:          TrialStatus,
    pub failure:         Option<String>,
}

impl TrialResult {
    pub fn from_outcome(
        index:   usize,
        config:  TrialConfig,
        params:  BTreeMap<String, f64>,
        outcome: TrialOutcome,
    ) -> Self {
        match outcome {
            // A non-finite objective is as useless as a crash.
            TrialOutcome::Completed(v) if v.is_finite() => Self {
                index, config, params,
                objective_value: v,
                status:  TrialStatus::Ok,
                failure: None,
            },
            TrialOutcome::Completed(v) => Self {
                index, config, params,
                objective_value: FAILED_TRIAL_OBJECTIVE,
                status:  TrialStatus::Failed,
                failure: Some(format!("non-finite objective {v}")),
            },
            TrialOutcome::Failed(reason) => Self {
                index, config, params,
                objective_value: FAILED_TRIAL_OBJECTIVE,
                status:  TrialStatus::Failed,
                failure: Some(reason),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == TrialStatus::Ok
    }
}
