use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
};

use crate::domain::error::ScorerError;

/// Contract of the pretrained text encoder the scorer sits on.
///
/// Split in two stages so the trainer can perturb the token
/// embeddings between them:
///   embed:          token ids [B, L]            → embeddings [B, L, H]
///   contextualize:  embeddings [B, L, H] + mask → hidden states [B, L, H]
pub trait TextEncoder<B: Backend> {
    fn hidden_size(&self) -> usize;

    fn embed(&self, token_ids: Tensor<B, 2, Int>) -> Tensor<B, 3>;

    /// `pad_mask` is true at padding positions.
    fn contextualize(&self, embeddings: Tensor<B, 3>, pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3>;

    /// First-token ([CLS]) representation: [B, L, H] → [B, H].
    fn summarize(&self, hidden: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch_size, _, hidden_size] = hidden.dims();
        hidden
            .slice([0..batch_size, 0..1, 0..hidden_size])
            .reshape([batch_size, hidden_size])
    }

    fn encode(&self, token_ids: Tensor<B, 2, Int>, pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 2> {
        let embeddings = self.embed(token_ids);
        self.summarize(self.contextualize(embeddings, pad_mask))
    }
}

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct TransformerEncoderConfig {
    pub vocab_size:  usize,
    pub max_seq_len: usize,
    pub hidden_size: usize,
    pub num_heads:   usize,
    pub num_layers:  usize,
    pub d_ff:        usize,
    #[config(default = 0.1)]
    pub dropout:     f64,
}

impl TransformerEncoderConfig {
    pub fn validate(&self) -> Result<(), ScorerError> {
        if self.num_heads == 0 || self.hidden_size % self.num_heads != 0 {
            return Err(ScorerError::Configuration(format!(
                "encoder hidden size {} is not divisible by {} attention heads",
                self.hidden_size, self.num_heads
            )));
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<TransformerEncoder<B>, ScorerError> {
        self.validate()?;
        let token_embedding    = EmbeddingConfig::new(self.vocab_size, self.hidden_size).init(device);
        let position_embedding = EmbeddingConfig::new(self.max_seq_len, self.hidden_size).init(device);
        let layers: Vec<EncoderBlock<B>> = (0..self.num_layers)
            .map(|_| self.build_encoder_block(device))
            .collect();
        let final_norm = LayerNormConfig::new(self.hidden_size).init(device);
        let dropout    = DropoutConfig::new(self.dropout).init();
        Ok(TransformerEncoder {
            token_embedding, position_embedding, layers, final_norm, dropout,
            hidden_size: self.hidden_size,
        })
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        let self_attn   = MultiHeadAttentionConfig::new(self.hidden_size, self.num_heads)
            .with_dropout(self.dropout)
            .init(device);
        let ffn_linear1 = LinearConfig::new(self.hidden_size, self.d_ff).init(device);
        let ffn_linear2 = LinearConfig::new(self.d_ff, self.hidden_size).init(device);
        let norm1   = LayerNormConfig::new(self.hidden_size).init(device);
        let norm2   = LayerNormConfig::new(self.hidden_size).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        EncoderBlock { self_attn, ffn_linear1, ffn_linear2, norm1, norm2, dropout }
    }
}

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    pub fn forward(&self, x: Tensor<B, 3>, pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let input = MhaInput::self_attn(x.clone()).mask_pad(pad_mask);
        let attn_output = self.self_attn.forward(input).context;
        let x = self.norm1.forward(x + self.dropout.forward(attn_output));
        let ffn_out = self.ffn_linear2.forward(
            burn::tensor::activation::gelu(self.ffn_linear1.forward(x.clone()))
        );
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

/// Compact post-norm transformer encoder. Stands in for the large
/// pretrained encoder; weights can be loaded from a record file.
#[derive(Module, Debug)]
pub struct TransformerEncoder<B: Backend> {
    pub token_embedding:    Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub layers:             Vec<EncoderBlock<B>>,
    pub final_norm:         LayerNorm<B>,
    pub dropout:            Dropout,
    pub hidden_size:        usize,
}

impl<B: Backend> TextEncoder<B> for TransformerEncoder<B> {
    fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn embed(&self, token_ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch_size, seq_len] = token_ids.dims();
        let tok_emb = self.token_embedding.forward(token_ids);

        // Self-attention is permutation-invariant, so position must be injected explicitly.
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &tok_emb.device())
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);
        tok_emb + self.position_embedding.forward(positions)
    }

    fn contextualize(&self, embeddings: Tensor<B, 3>, pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let mut x = self.dropout.forward(embeddings);
        for layer in &self.layers {
            x = layer.forward(x, pad_mask.clone());
        }
        self.final_norm.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn small_config() -> TransformerEncoderConfig {
        TransformerEncoderConfig::new(64, 12, 16, 4, 1, 32).with_dropout(0.0)
    }

    #[test]
    fn test_summary_shape_is_batch_by_hidden() {
        let device = Default::default();
        let encoder = small_config().init::<TestBackend>(&device).unwrap();
        for seq_len in [4usize, 12] {
            let ids  = Tensor::<TestBackend, 2, Int>::zeros([3, seq_len], &device);
            let mask = Tensor::<TestBackend, 2, Int>::zeros([3, seq_len], &device).equal_elem(1);
            assert_eq!(encoder.encode(ids, mask).dims(), [3, 16]);
        }
    }

    #[test]
    fn test_heads_must_divide_hidden_size() {
        let cfg = TransformerEncoderConfig::new(64, 12, 18, 4, 1, 32);
        let err = cfg.init::<TestBackend>(&Default::default()).unwrap_err();
        assert!(matches!(err, ScorerError::Configuration(_)));
    }
}
