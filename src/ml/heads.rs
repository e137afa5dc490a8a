// ============================================================
// Layer 5 — Dimension Heads
// ============================================================
// K independent regressors, one per output (class or dimension):
//
//   feature [B, H] ─┬─ head 0: H → 128 → 1 ─┐
//                   ├─ head 1: H → 128 → 1 ─┼─ cat → raw scores [B, K]
//                   └─ head K-1 ...        ─┘
//
// The Vec index of a head IS the identity of its output: head i
// is supervised by column i of the label vector and reported as
// the i-th declared class / dimension. Never reorder, sort or
// filter `heads`; that silently swaps supervision between axes.
//
// No activation is applied here; the scorer decides between
// log-softmax (classification) and sigmoid (regression).

use burn::{
    nn::{Dropout, DropoutConfig, LayerNorm, LayerNormConfig, Linear, LinearConfig},
    prelude::*,
};

use crate::domain::error::ScorerError;

pub const HEAD_HIDDEN: usize = 128;

#[derive(Config, Debug)]
pub struct DimensionHeadsConfig {
    pub hidden_size: usize,
    pub num_outputs: usize,
    #[config(default = 0.1)]
    pub dropout:     f64,
}

impl DimensionHeadsConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<DimensionHeads<B>, ScorerError> {
        if self.num_outputs == 0 {
            return Err(ScorerError::Configuration("at least one output head is required".into()));
        }
        let heads = (0..self.num_outputs)
            .map(|_| DimensionHead {
                input:   LinearConfig::new(self.hidden_size, HEAD_HIDDEN).init(device),
                norm:    LayerNormConfig::new(HEAD_HIDDEN).init(device),
                dropout: DropoutConfig::new(self.dropout).init(),
                output:  LinearConfig::new(HEAD_HIDDEN, 1).init(device),
            })
            .collect();
        Ok(DimensionHeads { heads })
    }
}

#[derive(Module, Debug)]
pub struct DimensionHead<B: Backend> {
    pub input:   Linear<B>,
    pub norm:    LayerNorm<B>,
    pub dropout: Dropout,
    pub output:  Linear<B>,
}

impl<B: Backend> DimensionHead<B> {
    /// [batch, H] → [batch, 1] raw score
    pub fn forward(&self, feature: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.norm.forward(self.input.forward(feature));
        let x = self.dropout.forward(burn::tensor::activation::gelu(x));
        self.output.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct DimensionHeads<B: Backend> {
    pub heads: Vec<DimensionHead<B>>,
}

impl<B: Backend> DimensionHeads<B> {
    pub fn num_outputs(&self) -> usize {
        self.heads.len()
    }

    /// [batch, H] → [batch, K], column i produced by `heads[i]`.
    pub fn forward(&self, feature: Tensor<B, 2>) -> Tensor<B, 2> {
        let scores: Vec<Tensor<B, 2>> = self
            .heads
            .iter()
            .map(|head| head.forward(feature.clone()))
            .collect();
        Tensor::cat(scores, 1)
    }
}
