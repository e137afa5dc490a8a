// ============================================================
// Layer 5 — Dynamic Loss Scaling
// ============================================================
// Low-precision arithmetic underflows small gradients to zero.
// Loss scaling multiplies the loss by a large factor S before
// backward, then divides the gradients by S before they are used:
//
//   backward(S · loss)  →  grads · S  →  unscale (÷ S)  →  clip  →  step
//
// Clipping ALWAYS sees unscaled gradients, so the configured max
// norm means the same thing with or without scaling.
//
// S adapts:
//   non-finite gradients → step skipped, S *= 0.5
//   `growth_interval` clean steps in a row → S *= 2
//
// Disabled, the scaler is the identity (S = 1, never skips).
//
// Reference: Micikevicius et al. (2018) Mixed Precision Training

#[derive(Debug, Clone)]
pub struct LossScaler {
    enabled:         bool,
    scale:           f64,
    growth_factor:   f64,
    backoff_factor:  f64,
    growth_interval: usize,
    clean_steps:     usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    /// Gradients are finite: apply the optimizer step.
    Step,
    /// Overflow: skip this step, the scale has been reduced.
    Skip,
}

impl LossScaler {
    pub const INITIAL_SCALE: f64 = 65536.0;

    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            scale:           if enabled { Self::INITIAL_SCALE } else { 1.0 },
            growth_factor:   2.0,
            backoff_factor:  0.5,
            growth_interval: 2000,
            clean_steps:     0,
        }
    }

    pub fn with_growth_interval(mut self, steps: usize) -> Self {
        self.growth_interval = steps.max(1);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Factor the loss is multiplied by before backward.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Factor that restores true gradient magnitude.
    pub fn inverse(&self) -> f64 {
        1.0 / self.scale
    }

    /// Record whether the unscaled gradients were finite and decide
    /// what the trainer does with this step.
    pub fn update(&mut self, grads_finite: bool) -> ScaleDecision {
        if !self.enabled {
            return ScaleDecision::Step;
        }
        if !grads_finite {
            self.scale = (self.scale * self.backoff_factor).max(1.0);
            self.clean_steps = 0;
            tracing::debug!("Loss scale backed off to {}", self.scale);
            return ScaleDecision::Skip;
        }
        self.clean_steps += 1;
        if self.clean_steps >= self.growth_interval {
            self.scale *= self.growth_factor;
            self.clean_steps = 0;
        }
        ScaleDecision::Step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_scaler_is_identity() {
        let mut s = LossScaler::new(false);
        assert_eq!(s.scale(), 1.0);
        assert_eq!(s.update(false), ScaleDecision::Step);
        assert_eq!(s.scale(), 1.0);
    }

    #[test]
    fn test_overflow_halves_scale_and_skips() {
        let mut s = LossScaler::new(true);
        assert_eq!(s.update(false), ScaleDecision::Skip);
        assert_eq!(s.scale(), LossScaler::INITIAL_SCALE / 2.0);
    }

    #[test]
    fn test_scale_grows_after_clean_interval() {
        let mut s = LossScaler::new(true).with_growth_interval(3);
        s.update(true);
        s.update(true);
        assert_eq!(s.scale(), LossScaler::INITIAL_SCALE);
        s.update(true);
        assert_eq!(s.scale(), LossScaler::INITIAL_SCALE * 2.0);
    }

    #[test]
    fn test_inverse_undoes_scale() {
        let s = LossScaler::new(true);
        assert_eq!(s.scale() * s.inverse(), 1.0);
    }
}
