// ============================================================
// Layer 4 — Sentiment Batcher
// ============================================================
// Implements Burn's Batcher trait to convert a Vec<SentimentItem>
// into tensors.
//
//   Input:  Vec of N items, each with sequences of length L
//   Output: SentimentBatch with token tensors of shape [N, L]
//
// All items are pre-padded to the same L, so batching is a
// flatten + reshape. Targets become either a [N] class tensor or
// a [N, K] score tensor. A dataset never mixes the two.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::{SentimentItem, Target};

#[derive(Debug, Clone)]
pub enum BatchTargets<B: Backend> {
    /// Class ids — shape [batch_size]
    Classes(Tensor<B, 1, Int>),
    /// Normalised scores — shape [batch_size, K]
    Scores(Tensor<B, 2>),
}

// ─── SentimentBatch ───────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct SentimentBatch<B: Backend> {
    /// Token ID sequences — shape: [batch_size, seq_len]
    pub token_ids: Tensor<B, 2, Int>,

    /// 1 = real token, 0 = padding — shape: [batch_size, seq_len]
    pub attention_mask: Tensor<B, 2, Int>,

    pub targets: BatchTargets<B>,

    /// Source texts, kept for error analysis
    pub texts: Vec<String>,
}

impl<B: Backend> SentimentBatch<B> {
    pub fn len(&self) -> usize {
        self.token_ids.dims()[0]
    }

    /// True where the position is padding (what attention must ignore).
    pub fn pad_mask(&self) -> Tensor<B, 2, Bool> {
        self.attention_mask.clone().equal_elem(0)
    }
}

// ─── SentimentBatcher ─────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct SentimentBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> SentimentBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<SentimentItem, SentimentBatch<B>> for SentimentBatcher<B> {
    fn batch(&self, items: Vec<SentimentItem>) -> SentimentBatch<B> {
        let batch_size = items.len();
        let seq_len    = items[0].input_ids.len();

        let input_flat: Vec<i32> = items
            .iter()
            .flat_map(|s| s.input_ids.iter().map(|&x| x as i32))
            .collect();

        let mask_flat: Vec<i32> = items
            .iter()
            .flat_map(|s| s.attention_mask.iter().map(|&x| x as i32))
            .collect();

        let token_ids = Tensor::<B, 1, Int>::from_ints(
            input_flat.as_slice(), &self.device
        ).reshape([batch_size, seq_len]);

        let attention_mask = Tensor::<B, 1, Int>::from_ints(
            mask_flat.as_slice(), &self.device
        ).reshape([batch_size, seq_len]);

        let targets = match &items[0].target {
            Target::Class(_) => {
                let classes: Vec<i32> = items
                    .iter()
                    .map(|s| match s.target {
                        Target::Class(c) => c as i32,
                        Target::Scores(_) => 0,
                    })
                    .collect();
                BatchTargets::Classes(Tensor::<B, 1, Int>::from_ints(
                    classes.as_slice(), &self.device
                ))
            }
            Target::Scores(first) => {
                let k = first.len();
                let scores: Vec<f32> = items
                    .iter()
                    .flat_map(|s| match &s.target {
                        Target::Scores(v) => v.clone(),
                        Target::Class(_)  => vec![0.0; k],
                    })
                    .collect();
                BatchTargets::Scores(Tensor::<B, 1>::from_floats(
                    scores.as_slice(), &self.device
                ).reshape([batch_size, k]))
            }
        };

        let texts = items.into_iter().map(|s| s.text).collect();

        SentimentBatch { token_ids, attention_mask, targets, texts }
    }
}
