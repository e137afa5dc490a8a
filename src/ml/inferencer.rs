// ============================================================
// Layer 5 — Inference Context
// ============================================================
// Everything `predict` needs, built once and passed by reference:
//
//   tokenizer + frozen encoder + trained scorer + task mode
//
// There is no global model state; a serving layer constructs one
// InferenceContext at start-up and shares it with its handlers.
//
//   text → clean → [CLS] ids [SEP] pad → encoder → scorer
//        → classification: argmax, probabilities, confidence
//        → regression:     each dimension rescaled to its range
use anyhow::Result;
use burn::prelude::*;
use tokenizers::Tokenizer;

use crate::analysis::classification::argmax;
use crate::data::{encoding::encode_text, preprocessor::Preprocessor};
use crate::domain::{
    error::ScorerError,
    example::TaskMode,
    prediction::Prediction,
    traits::Predictor,
};
use crate::ml::{
    encoder::{TextEncoder, TransformerEncoder},
    ensemble::EnsembleCombiner,
    model::{OutputMode, Scorer, SentimentModel},
};

/// The scorer restored from a checkpoint: one model or an ensemble.
#[derive(Debug)]
pub enum LoadedScorer<B: Backend> {
    Single(SentimentModel<B>),
    Ensemble(EnsembleCombiner<B>),
}

impl<B: Backend> Scorer<B> for LoadedScorer<B> {
    fn output_mode(&self) -> OutputMode {
        match self {
            LoadedScorer::Single(m)   => m.output_mode(),
            LoadedScorer::Ensemble(e) => e.output_mode(),
        }
    }

    fn num_outputs(&self) -> usize {
        match self {
            LoadedScorer::Single(m)   => m.num_outputs(),
            LoadedScorer::Ensemble(e) => e.num_outputs(),
        }
    }

    fn score(&self, summary: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            LoadedScorer::Single(m)   => m.score(summary),
            LoadedScorer::Ensemble(e) => e.score(summary),
        }
    }
}

/// Build the public prediction from one row of unit outputs.
pub fn prediction_from_unit(task: &TaskMode, unit: &[f64]) -> Prediction {
    let names = task.output_names();
    let best  = argmax(unit);
    let label = names.get(best).cloned().unwrap_or_else(|| best.to_string());

    match task {
        TaskMode::Classification { .. } => Prediction {
            label,
            scores:        names.into_iter().zip(unit.iter().copied()).collect(),
            probabilities: Some(unit.to_vec()),
            confidence:    unit.get(best).copied(),
        },
        TaskMode::Regression { dimensions } => Prediction {
            label,
            scores: dimensions
                .iter()
                .zip(unit)
                .map(|(d, &u)| (d.name.clone(), d.denormalize(u)))
                .collect(),
            probabilities: None,
            confidence:    None,
        },
    }
}

pub struct InferenceContext<B: Backend> {
    tokenizer:   Tokenizer,
    encoder:     TransformerEncoder<B>,
    scorer:      LoadedScorer<B>,
    task:        TaskMode,
    max_seq_len: usize,
    cleaner:     Preprocessor,
    device:      B::Device,
}

impl<B: Backend> InferenceContext<B> {
    pub fn new(
        tokenizer:   Tokenizer,
        encoder:     TransformerEncoder<B>,
        scorer:      LoadedScorer<B>,
        task:        TaskMode,
        max_seq_len: usize,
        device:      B::Device,
    ) -> Result<Self, ScorerError> {
        if scorer.num_outputs() != task.output_size() {
            return Err(ScorerError::Configuration(format!(
                "scorer has {} outputs but the task declares {}",
                scorer.num_outputs(), task.output_size()
            )));
        }
        Ok(Self { tokenizer, encoder, scorer, task, max_seq_len, cleaner: Preprocessor::new(), device })
    }

    /// Score a batch of texts in one forward pass.
    pub fn predict_batch(&self, texts: &[String]) -> Result<Vec<Prediction>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut ids  = Vec::with_capacity(texts.len() * self.max_seq_len);
        let mut mask = Vec::with_capacity(texts.len() * self.max_seq_len);
        for text in texts {
            let enc = encode_text(&self.tokenizer, &self.cleaner.clean(text), self.max_seq_len)?;
            ids.extend(enc.input_ids.iter().map(|&x| x as i32));
            mask.extend(enc.attention_mask.iter().map(|&x| x as i32));
        }

        let shape    = [texts.len(), self.max_seq_len];
        let ids      = Tensor::<B, 1, Int>::from_ints(ids.as_slice(), &self.device).reshape(shape);
        let pad_mask = Tensor::<B, 1, Int>::from_ints(mask.as_slice(), &self.device)
            .reshape(shape)
            .equal_elem(0);

        let outputs = self.scorer.score(self.encoder.encode(ids, pad_mask));
        let unit: Vec<f64> = self
            .scorer
            .output_mode()
            .to_unit(outputs)
            .into_data()
            .iter::<f64>()
            .collect();

        let predictions: Vec<Prediction> = unit
            .chunks(self.task.output_size())
            .map(|row| prediction_from_unit(&self.task, row))
            .collect();
        tracing::debug!("Scored {} texts", predictions.len());
        Ok(predictions)
    }
}

impl<B: Backend> Predictor for InferenceContext<B> {
    fn predict(&self, text: &str) -> Result<Prediction> {
        self.predict_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("no prediction produced"))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dimension::DimensionSpec;
    use crate::infra::tokenizer_store::{id_space, TokenizerStore};
    use crate::ml::encoder::TransformerEncoderConfig;
    use crate::ml::model::SentimentModelConfig;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_classification_prediction_reports_confidence() {
        let p = prediction_from_unit(&TaskMode::sentiment(), &[0.1, 0.2, 0.7]);
        assert_eq!(p.label, "positive");
        assert_eq!(p.confidence, Some(0.7));
        assert_eq!(p.probabilities.as_deref(), Some(&[0.1, 0.2, 0.7][..]));
    }

    #[test]
    fn test_regression_prediction_is_rescaled() {
        let task = TaskMode::Regression {
            dimensions: vec![DimensionSpec::new("valence", -1.0, 1.0), DimensionSpec::new("anxiety", 0.0, 21.0)],
        };
        let p = prediction_from_unit(&task, &[0.25, 1.0]);
        assert_eq!(p.score("valence"), Some(-0.5));
        assert_eq!(p.score("anxiety"), Some(21.0));
        assert!(p.confidence.is_none());
    }

    #[test]
    fn test_context_predicts_probabilities() {
        let tmp = tempfile::tempdir().unwrap();
        let tokenizer = TokenizerStore::new(tmp.path())
            .load_or_build(&["i love this".to_string(), "i hate that".to_string()], 50)
            .unwrap();
        let device  = Default::default();
        let encoder = TransformerEncoderConfig::new(id_space(&tokenizer), 8, 8, 2, 1, 16)
            .init::<TestBackend>(&device)
            .unwrap();
        let task  = TaskMode::sentiment();
        let model = SentimentModelConfig::for_task(8, &task).init::<TestBackend>(&device).unwrap();
        let ctx = InferenceContext::new(tokenizer, encoder, LoadedScorer::Single(model), task, 8, device)
            .unwrap();

        let p = ctx.predict("I love this!").unwrap();
        let probs = p.probabilities.unwrap();
        assert_eq!(probs.len(), 3);
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-4);
        assert_eq!(p.confidence, Some(probs.iter().cloned().fold(f64::MIN, f64::max)));
    }

    #[test]
    fn test_output_count_mismatch_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let tokenizer = TokenizerStore::new(tmp.path()).load_or_build(&["a b".to_string()], 20).unwrap();
        let device  = Default::default();
        let encoder = TransformerEncoderConfig::new(110, 8, 8, 2, 1, 16).init::<TestBackend>(&device).unwrap();
        let model   = SentimentModelConfig::new(8, 2, OutputMode::LogSoftmax).init::<TestBackend>(&device).unwrap();
        let result  = InferenceContext::new(
            tokenizer, encoder, LoadedScorer::Single(model), TaskMode::sentiment(), 8, device,
        );
        assert!(matches!(result, Err(ScorerError::Configuration(_))));
    }
}
