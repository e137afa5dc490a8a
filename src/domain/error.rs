// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Every failure the scorer can report falls into one of these
// buckets. Each bucket has a different recovery policy:
//
//   Configuration    → fatal at construction, abort immediately
//   Data             → offending rows are dropped, never fatal
//   NumericalFailure → search: trial penalised; single run: surfaced
//   CheckpointIo     → logged, training continues without the file
//   BudgetExceeded   → trial abandoned at an epoch boundary
//
// Reference: Rust Book §9 (Error Handling)

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScorerError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("data error: {0}")]
    Data(String),

    #[error("numerical failure: {0}")]
    NumericalFailure(String),

    #[error("checkpoint io error: {0}")]
    CheckpointIo(String),

    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),
}

impl ScorerError {
    /// True for failures the hyperparameter search absorbs as a
    /// penalised trial instead of aborting.
    pub fn is_trial_recoverable(&self) -> bool {
        matches!(
            self,
            ScorerError::NumericalFailure(_)
                | ScorerError::BudgetExceeded(_)
                | ScorerError::CheckpointIo(_)
                | ScorerError::Data(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_are_not_recoverable() {
        let err = ScorerError::Configuration("heads".into());
        assert!(!err.is_trial_recoverable());
        assert!(ScorerError::NumericalFailure("nan".into()).is_trial_recoverable());
    }

    #[test]
    fn test_display_includes_category() {
        let err = ScorerError::NumericalFailure("loss is NaN".into());
        assert_eq!(err.to_string(), "numerical failure: loss is NaN");
    }
}
