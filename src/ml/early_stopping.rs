// ============================================================
// Layer 5 — Early Stopping
// ============================================================
// One monitor per training run. It owns its state; nothing else
// reads or writes the counters, and a new trial builds a new one.
//
//   first evaluation          → becomes best, counter stays 0
//   val < best − min_delta    → new best, counter reset
//   otherwise                 → counter += 1
//   counter ≥ patience        → should_stop
//
// Equal losses never count as improvement.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EarlyStoppingState {
    pub best_loss:   Option<f64>,
    pub stale_count: usize,
    pub should_stop: bool,
}

/// What one observation did to the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Improved,
    Stale,
    Stop,
}

#[derive(Debug, Clone)]
pub struct EarlyStoppingMonitor {
    patience:  usize,
    min_delta: f64,
    state:     EarlyStoppingState,
}

impl EarlyStoppingMonitor {
    pub fn new(patience: usize, min_delta: f64) -> Self {
        Self { patience, min_delta: min_delta.max(0.0), state: EarlyStoppingState::default() }
    }

    pub fn state(&self) -> &EarlyStoppingState {
        &self.state
    }

    pub fn best_loss(&self) -> Option<f64> {
        self.state.best_loss
    }

    pub fn should_stop(&self) -> bool {
        self.state.should_stop
    }

    /// Record one validation loss. Non-finite losses are never an improvement.
    pub fn observe(&mut self, val_loss: f64) -> Observation {
        let improved = match self.state.best_loss {
            None       => val_loss.is_finite(),
            Some(best) => val_loss < best - self.min_delta,
        };

        if improved {
            self.state.best_loss   = Some(val_loss);
            self.state.stale_count = 0;
            return Observation::Improved;
        }

        self.state.stale_count += 1;
        if self.patience > 0 && self.state.stale_count >= self.patience {
            self.state.should_stop = true;
            Observation::Stop
        } else {
            Observation::Stale
        }
    }
}
