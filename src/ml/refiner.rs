use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        LayerNorm, LayerNormConfig,
    },
    prelude::*,
};

use crate::domain::error::ScorerError;

/// Multi-head self-attention used to re-weight feature components
/// before scoring. Works on a single feature vector (a length-1
/// sequence) or on a stack of vectors.
#[derive(Config, Debug)]
pub struct CrossAttentionRefinerConfig {
    pub hidden_size: usize,
    #[config(default = 16)]
    pub num_heads:   usize,
    #[config(default = 0.1)]
    pub dropout:     f64,
}

impl CrossAttentionRefinerConfig {
    /// Fails instead of letting the attention block truncate the
    /// per-head width when the head count does not divide H.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<CrossAttentionRefiner<B>, ScorerError> {
        if self.num_heads == 0 || self.hidden_size % self.num_heads != 0 {
            return Err(ScorerError::Configuration(format!(
                "refiner head count {} does not evenly divide hidden size {}",
                self.num_heads, self.hidden_size
            )));
        }
        Ok(CrossAttentionRefiner {
            attention: MultiHeadAttentionConfig::new(self.hidden_size, self.num_heads)
                .with_dropout(self.dropout)
                .init(device),
            norm: LayerNormConfig::new(self.hidden_size).init(device),
        })
    }
}

#[derive(Module, Debug)]
pub struct CrossAttentionRefiner<B: Backend> {
    pub attention: MultiHeadAttention<B>,
    pub norm:      LayerNorm<B>,
}

impl<B: Backend> CrossAttentionRefiner<B> {
    /// [batch, seq, H] → [batch, seq, H], residual + norm.
    pub fn forward_sequence(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let context = self.attention.forward(MhaInput::self_attn(x.clone())).context;
        self.norm.forward(x + context)
    }

    /// [batch, H] → [batch, H]
    pub fn forward(&self, feature: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch_size, hidden_size] = feature.dims();
        self.forward_sequence(feature.unsqueeze_dim::<3>(1))
            .reshape([batch_size, hidden_size])
    }
}
