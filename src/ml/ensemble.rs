// ============================================================
// Layer 5 — Ensemble Combiner
// ============================================================
// M independently initialised SentimentModels scored on the same
// encoder summary, merged by a learned convex combination:
//
//   member outputs in unit space     stacked  [B, K, M]
//   attention Linear(M → M) + softmax over M  weights [B, K, M]
//   Σ_m weights · outputs                     combined [B, K]
//
// Weights for each (sample, output) pair sum to 1, so regression
// scores stay inside (0, 1). In classification mode each class
// column gets its own mix of member PROBABILITIES, so the mixed row
// is renormalised to sum to 1 before the log is taken.

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation,
};

use crate::domain::error::ScorerError;
use crate::ml::model::{OutputMode, Scorer, SentimentModel, SentimentModelConfig};

const LOG_FLOOR: f64 = 1e-12;

#[derive(Config, Debug)]
pub struct EnsembleConfig {
    pub member:      SentimentModelConfig,
    pub num_members: usize,
}

impl EnsembleConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<EnsembleCombiner<B>, ScorerError> {
        if self.num_members < 2 {
            return Err(ScorerError::Configuration(format!(
                "an ensemble needs at least 2 members, got {}", self.num_members
            )));
        }
        let members = (0..self.num_members)
            .map(|_| self.member.init(device))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(EnsembleCombiner {
            members,
            attention: LinearConfig::new(self.num_members, self.num_members).init(device),
        })
    }
}

#[derive(Module, Debug)]
pub struct EnsembleCombiner<B: Backend> {
    pub members:   Vec<SentimentModel<B>>,
    pub attention: Linear<B>,
}

impl<B: Backend> EnsembleCombiner<B> {
    /// Member outputs in unit space, stacked on the last axis: [B, K, M].
    fn stacked(&self, summary: Tensor<B, 2>) -> Tensor<B, 3> {
        let outputs: Vec<Tensor<B, 2>> = self
            .members
            .iter()
            .map(|m| m.output_mode().to_unit(m.score(summary.clone())))
            .collect();
        Tensor::stack(outputs, 2)
    }

    fn weights_for(&self, stacked: Tensor<B, 3>) -> Tensor<B, 3> {
        activation::softmax(self.attention.forward(stacked), 2)
    }

    /// Combination weights per (sample, output) over the members: [B, K, M].
    pub fn combination_weights(&self, summary: Tensor<B, 2>) -> Tensor<B, 3> {
        self.weights_for(self.stacked(summary))
    }
}

impl<B: Backend> Scorer<B> for EnsembleCombiner<B> {
    fn output_mode(&self) -> OutputMode {
        self.members
            .first()
            .map(|m| m.output_mode())
            .unwrap_or(OutputMode::Sigmoid)
    }

    fn num_outputs(&self) -> usize {
        self.members.first().map(|m| m.num_outputs()).unwrap_or(0)
    }

    fn score(&self, summary: Tensor<B, 2>) -> Tensor<B, 2> {
        let stacked = self.stacked(summary);
        let [batch_size, k, _] = stacked.dims();
        let weights  = self.weights_for(stacked.clone());
        let combined = (stacked * weights).sum_dim(2).reshape([batch_size, k]);
        match self.output_mode() {
            OutputMode::LogSoftmax => {
                let combined = combined.clamp_min(LOG_FLOOR);
                let total    = combined.clone().sum_dim(1);
                (combined / total).log()
            }
            OutputMode::Sigmoid    => combined,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    fn ensemble(mode: OutputMode, members: usize) -> EnsembleCombiner<TestBackend> {
        EnsembleConfig::new(SentimentModelConfig::new(8, 3, mode), members)
            .init(&Default::default())
            .unwrap()
    }

    #[test]
    fn test_weights_sum_to_one_per_sample_and_output() {
        let device = Default::default();
        let ens = ensemble(OutputMode::Sigmoid, 4);
        let x = Tensor::<TestBackend, 2>::random([5, 8], Distribution::Normal(0.0, 2.0), &device);
        let weights = ens.combination_weights(x);
        assert_eq!(weights.dims(), [5, 3, 4]);
        let sums: Vec<f32> = weights.sum_dim(2).into_data().to_vec().unwrap();
        assert_eq!(sums.len(), 15);
        for s in sums {
            assert!((s - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_classification_ensemble_stays_log_normalised() {
        let device = Default::default();
        let ens = ensemble(OutputMode::LogSoftmax, 3);
        let x = Tensor::<TestBackend, 2>::random([4, 8], Distribution::Default, &device);
        let out = ens.score(x);
        assert_eq!(out.dims(), [4, 3]);
        let sums: Vec<f32> = out.exp().sum_dim(1).into_data().to_vec().unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_classification_rows_normalised_for_wide_inputs() {
        let device = Default::default();
        for _ in 0..20 {
            let ens = ensemble(OutputMode::LogSoftmax, 3);
            let x = Tensor::<TestBackend, 2>::random([6, 8], Distribution::Normal(0.0, 3.0), &device);
            let sums: Vec<f32> = ens.score(x).exp().sum_dim(1).into_data().to_vec().unwrap();
            for s in sums {
                assert!((s - 1.0).abs() < 1e-4, "row sums to {s}");
            }
        }
    }

    #[test]
    fn test_single_member_is_rejected() {
        let err = EnsembleConfig::new(SentimentModelConfig::new(8, 3, OutputMode::Sigmoid), 1)
            .init::<TestBackend>(&Default::default())
            .unwrap_err();
        assert!(matches!(err, ScorerError::Configuration(_)));
    }
}
