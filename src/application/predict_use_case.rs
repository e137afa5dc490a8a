// ============================================================
// Layer 2 — PredictUseCase
// ============================================================
// Loads a trained checkpoint once into an InferenceContext and
// scores any number of texts with it.
//
//   classification → label, probabilities, confidence
//   regression     → every dimension in its physical range

use anyhow::Result;
use burn::tensor::backend::AutodiffBackend;

use crate::application::artifacts::Artifacts;
use crate::domain::prediction::Prediction;
use crate::infra::checkpoint::BEST_MODEL;
use crate::ml::backend::{dispatch, BackendKind, BackendTask};

#[derive(Debug, Clone)]
pub struct PredictConfig {
    pub checkpoint_dir: String,
    pub weights:        String,
    pub texts:          Vec<String>,
    pub backend:        BackendKind,
}

impl PredictConfig {
    pub fn new(checkpoint_dir: impl Into<String>, texts: Vec<String>) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            weights:        BEST_MODEL.to_string(),
            texts,
            backend:        BackendKind::default(),
        }
    }
}

pub struct PredictUseCase {
    config: PredictConfig,
}

impl PredictUseCase {
    pub fn new(config: PredictConfig) -> Self {
        Self { config }
    }

    /// One prediction per input text, in input order.
    pub fn execute(self) -> Result<Vec<Prediction>> {
        let backend = self.config.backend;
        dispatch(backend, self)
    }
}

impl BackendTask for PredictUseCase {
    type Output = Vec<Prediction>;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> Result<Vec<Prediction>> {
        let cfg = self.config;
        let ctx = Artifacts::<B::InnerBackend>::load(&cfg.checkpoint_dir, &cfg.weights, &device)?
            .into_inference(device)?;
        ctx.predict_batch(&cfg.texts)
    }
}
