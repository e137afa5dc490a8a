/// Linear warm-up to `peak_lr`, then linear decay to zero.
///
/// ```text
///   lr
///   ▲      peak
///   │     /\
///   │    /   \___
///   │   /        \___
///   └──┴─────────────┴──▶ optimizer step
///      warmup        total
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LinearWarmupSchedule {
    peak_lr:      f64,
    warmup_steps: usize,
    total_steps:  usize,
}

impl LinearWarmupSchedule {
    pub fn new(peak_lr: f64, warmup_ratio: f64, total_steps: usize) -> Self {
        let total_steps  = total_steps.max(1);
        let warmup_steps = ((total_steps as f64) * warmup_ratio.clamp(0.0, 1.0)).round() as usize;
        Self { peak_lr, warmup_steps, total_steps }
    }

    pub fn warmup_steps(&self) -> usize {
        self.warmup_steps
    }

    /// Learning rate for the optimizer step with 0-based index `step`.
    pub fn lr_at(&self, step: usize) -> f64 {
        if step < self.warmup_steps {
            return self.peak_lr * step as f64 / self.warmup_steps as f64;
        }
        let remaining = self.total_steps.saturating_sub(step) as f64;
        let decay_len = (self.total_steps - self.warmup_steps).max(1) as f64;
        self.peak_lr * (remaining / decay_len).max(0.0)
    }
}

/// Optimizer steps in a run: ceil(batches / accumulation) per epoch.
pub fn total_optimizer_steps(batches_per_epoch: usize, accumulation_steps: usize, epochs: usize) -> usize {
    batches_per_epoch.div_ceil(accumulation_steps.max(1)) * epochs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warmup_rises_linearly_from_zero() {
        let s = LinearWarmupSchedule::new(1e-3, 0.1, 100);
        assert_eq!(s.warmup_steps(), 10);
        assert_eq!(s.lr_at(0), 0.0);
        assert!((s.lr_at(5) - 5e-4).abs() < 1e-12);
        assert!((s.lr_at(10) - 1e-3).abs() < 1e-12);
    }

    #[test]
    fn test_decays_to_zero_at_end() {
        let s = LinearWarmupSchedule::new(1.0, 0.1, 100);
        assert!((s.lr_at(55) - 0.5).abs() < 1e-12);
        assert_eq!(s.lr_at(100), 0.0);
        assert_eq!(s.lr_at(150), 0.0);
    }

    #[test]
    fn test_no_warmup_starts_at_peak() {
        let s = LinearWarmupSchedule::new(2.0, 0.0, 10);
        assert_eq!(s.lr_at(0), 2.0);
    }

    #[test]
    fn test_total_steps_rounds_up_partial_accumulation() {
        assert_eq!(total_optimizer_steps(10, 4, 3), 9);
        assert_eq!(total_optimizer_steps(8, 1, 2), 16);
    }
}
