use burn::{
    nn::{Dropout, DropoutConfig, LayerNorm, LayerNormConfig, Linear, LinearConfig},
    prelude::*,
};

/// Refines the encoder's [CLS] vector before it reaches the heads:
/// linear → layer norm → GELU → dropout, H → H.
#[derive(Config, Debug)]
pub struct FeatureExtractorConfig {
    pub hidden_size: usize,
    #[config(default = 0.1)]
    pub dropout:     f64,
}

impl FeatureExtractorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> FeatureExtractor<B> {
        FeatureExtractor {
            linear:  LinearConfig::new(self.hidden_size, self.hidden_size).init(device),
            norm:    LayerNormConfig::new(self.hidden_size).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct FeatureExtractor<B: Backend> {
    pub linear:  Linear<B>,
    pub norm:    LayerNorm<B>,
    pub dropout: Dropout,
}

impl<B: Backend> FeatureExtractor<B> {
    /// [batch, H] → [batch, H]
    pub fn forward(&self, summary: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.norm.forward(self.linear.forward(summary));
        self.dropout.forward(burn::tensor::activation::gelu(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_preserves_hidden_size() {
        let device = Default::default();
        let fx = FeatureExtractorConfig::new(8).init::<TestBackend>(&device);
        let out = fx.forward(Tensor::ones([5, 8], &device));
        assert_eq!(out.dims(), [5, 8]);
    }

    #[test]
    fn test_deterministic_without_dropout() {
        let device = Default::default();
        let fx = FeatureExtractorConfig::new(8).with_dropout(0.0).init::<TestBackend>(&device);
        let x  = Tensor::<TestBackend, 2>::random([2, 8], burn::tensor::Distribution::Default, &device);
        let a: Vec<f32> = fx.forward(x.clone()).into_data().to_vec().unwrap();
        let b: Vec<f32> = fx.forward(x).into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }
}
