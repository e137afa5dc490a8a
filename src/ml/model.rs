// ============================================================
// Layer 5 — Sentiment Model (trainable model state)
// ============================================================
// The trainable part that sits on top of the frozen encoder:
//
//   [CLS] summary [B, H]
//        │
//        ▼
//   FeatureExtractor        linear → norm → GELU → dropout
//        │
//        ▼
//   CrossAttentionRefiner   optional
//        │
//        ▼
//   DimensionHeads          K raw scores [B, K]
//        │
//        ▼
//   OutputMode              log-softmax  (classification)
//                           sigmoid      (regression)
//
// The encoder is NOT part of this module: it is borrowed, never
// trained, and never written into a checkpoint of this model.
//
// Reference: Burn Book §3 (Building Blocks)

use burn::{
    module::Ignored,
    prelude::*,
    tensor::activation,
};
use serde::{Deserialize, Serialize};

use crate::data::batcher::BatchTargets;
use crate::domain::error::ScorerError;
use crate::domain::example::TaskMode;
use crate::ml::feature::{FeatureExtractor, FeatureExtractorConfig};
use crate::ml::heads::{DimensionHeads, DimensionHeadsConfig};
use crate::ml::refiner::{CrossAttentionRefiner, CrossAttentionRefinerConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputMode {
    /// Rows are log-probabilities over K classes.
    LogSoftmax,
    /// Each column is an independent score in (0, 1).
    Sigmoid,
}

impl OutputMode {
    pub fn for_task(mode: &TaskMode) -> Self {
        if mode.is_classification() { OutputMode::LogSoftmax } else { OutputMode::Sigmoid }
    }

    pub fn apply<B: Backend>(&self, raw: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            OutputMode::LogSoftmax => activation::log_softmax(raw, 1),
            OutputMode::Sigmoid    => activation::sigmoid(raw),
        }
    }

    /// Probabilities (classification) or unit scores (regression).
    pub fn to_unit<B: Backend>(&self, outputs: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            OutputMode::LogSoftmax => outputs.exp(),
            OutputMode::Sigmoid    => outputs,
        }
    }
}

/// Anything that maps the encoder summary to K post-processed outputs.
/// Implemented by a single SentimentModel and by the ensemble.
pub trait Scorer<B: Backend> {
    fn output_mode(&self) -> OutputMode;

    fn num_outputs(&self) -> usize;

    /// [batch, H] → [batch, K]
    fn score(&self, summary: Tensor<B, 2>) -> Tensor<B, 2>;
}

/// Loss of post-processed `outputs` against batch targets.
///
///   LogSoftmax + classes → negative log-likelihood (= cross-entropy)
///   Sigmoid    + scores  → mean squared error, optionally per-dimension weighted
pub fn scoring_loss<B: Backend>(
    mode:      OutputMode,
    outputs:   Tensor<B, 2>,
    targets:   &BatchTargets<B>,
    dim_weights: Option<&[f32]>,
) -> Result<Tensor<B, 1>, ScorerError> {
    match (mode, targets) {
        (OutputMode::LogSoftmax, BatchTargets::Classes(classes)) => {
            let picked = outputs.gather(1, classes.clone().unsqueeze_dim::<2>(1));
            Ok(picked.mean().neg())
        }
        (OutputMode::Sigmoid, BatchTargets::Scores(scores)) => {
            let squared = (outputs - scores.clone()).powf_scalar(2.0);
            match dim_weights {
                Some(w) => {
                    let [_, k] = squared.dims();
                    if w.len() != k {
                        return Err(ScorerError::Configuration(format!(
                            "{} dimension weights for {} outputs", w.len(), k
                        )));
                    }
                    let weights = Tensor::<B, 1>::from_floats(w, &squared.device())
                        .unsqueeze::<2>();
                    Ok((squared * weights).mean())
                }
                None => Ok(squared.mean()),
            }
        }
        (OutputMode::LogSoftmax, BatchTargets::Scores(_)) => Err(ScorerError::Configuration(
            "classification model received score targets".into(),
        )),
        (OutputMode::Sigmoid, BatchTargets::Classes(_)) => Err(ScorerError::Configuration(
            "regression model received class targets".into(),
        )),
    }
}

#[derive(Config, Debug)]
pub struct SentimentModelConfig {
    pub hidden_size:   usize,
    pub num_outputs:   usize,
    pub output_mode:   OutputMode,
    #[config(default = 0.1)]
    pub dropout:       f64,
    /// Attention heads of the optional refiner; None disables it.
    #[config(default = "None")]
    pub refiner_heads: Option<usize>,
}

impl SentimentModelConfig {
    pub fn for_task(hidden_size: usize, mode: &TaskMode) -> Self {
        Self::new(hidden_size, mode.output_size(), OutputMode::for_task(mode))
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<SentimentModel<B>, ScorerError> {
        let features = FeatureExtractorConfig::new(self.hidden_size)
            .with_dropout(self.dropout)
            .init(device);
        let refiner = match self.refiner_heads {
            Some(heads) => Some(
                CrossAttentionRefinerConfig::new(self.hidden_size)
                    .with_num_heads(heads)
                    .with_dropout(self.dropout)
                    .init(device)?,
            ),
            None => None,
        };
        let heads = DimensionHeadsConfig::new(self.hidden_size, self.num_outputs)
            .with_dropout(self.dropout)
            .init(device)?;
        Ok(SentimentModel { features, refiner, heads, output_mode: Ignored(self.output_mode) })
    }
}

#[derive(Module, Debug)]
pub struct SentimentModel<B: Backend> {
    pub features:    FeatureExtractor<B>,
    pub refiner:     Option<CrossAttentionRefiner<B>>,
    pub heads:       DimensionHeads<B>,
    pub output_mode: Ignored<OutputMode>,
}

impl<B: Backend> SentimentModel<B> {
    /// Raw head scores before the output activation, [batch, K].
    pub fn raw_scores(&self, summary: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.features.forward(summary);
        let x = match &self.refiner {
            Some(refiner) => refiner.forward(x),
            None          => x,
        };
        self.heads.forward(x)
    }
}

impl<B: Backend> Scorer<B> for SentimentModel<B> {
    fn output_mode(&self) -> OutputMode {
        self.output_mode.0
    }

    fn num_outputs(&self) -> usize {
        self.heads.num_outputs()
    }

    fn score(&self, summary: Tensor<B, 2>) -> Tensor<B, 2> {
        self.output_mode.0.apply(self.raw_scores(summary))
    }
}
