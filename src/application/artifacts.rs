// ============================================================
// Layer 2 — Trained Artifacts
// ============================================================
// Rebuilds everything a finished run left in its checkpoint dir:
//
//   train_config.json → architecture + task mode
//   tokenizer.json    → same vocabulary as training
//   encoder.mpk.gz    → frozen encoder
//   {weights}.mpk.gz  → single scorer or ensemble, per ensemble_size
//
// Used by `evaluate` and `predict`; both run on the inner backend.

use anyhow::{Context, Result};
use burn::prelude::*;
use tokenizers::Tokenizer;

use crate::application::train_use_case::TrainConfig;
use crate::infra::{
    checkpoint::{CheckpointManager, ENCODER},
    tokenizer_store::{id_space, TokenizerStore},
};
use crate::ml::{
    encoder::TransformerEncoder,
    ensemble::EnsembleConfig,
    inferencer::{InferenceContext, LoadedScorer},
};

pub struct Artifacts<B: Backend> {
    pub config:    TrainConfig,
    pub tokenizer: Tokenizer,
    pub encoder:   TransformerEncoder<B>,
    pub scorer:    LoadedScorer<B>,
}

impl<B: Backend> Artifacts<B> {
    /// `weights` is a checkpoint name such as `best_model` or `final_model`.
    pub fn load(checkpoint_dir: &str, weights: &str, device: &B::Device) -> Result<Self> {
        let ckpt = CheckpointManager::new(checkpoint_dir);
        let config: TrainConfig = ckpt.load_config()?;
        let tokenizer = TokenizerStore::new(checkpoint_dir).load()?;

        let encoder = config.encoder_config(id_space(&tokenizer)).init::<B>(device)?;
        let encoder = ckpt
            .load_module(encoder, ENCODER, device)
            .context("Encoder weights do not match train_config.json")?;

        let member = config.model_config();
        let scorer = if config.ensemble_size > 1 {
            let ensemble = EnsembleConfig::new(member, config.ensemble_size).init::<B>(device)?;
            LoadedScorer::Ensemble(ckpt.load_module(ensemble, weights, device)?)
        } else {
            LoadedScorer::Single(ckpt.load_module(member.init::<B>(device)?, weights, device)?)
        };
        tracing::info!(
            "Loaded '{}' from '{}' ({} outputs, ensemble_size={})",
            weights, checkpoint_dir, config.task.output_size(), config.ensemble_size,
        );

        Ok(Self { config, tokenizer, encoder, scorer })
    }

    pub fn into_inference(self, device: B::Device) -> Result<InferenceContext<B>> {
        let max_seq_len = self.config.max_seq_len;
        Ok(InferenceContext::new(
            self.tokenizer,
            self.encoder,
            self.scorer,
            self.config.task,
            max_seq_len,
            device,
        )?)
    }
}
