// ============================================================
// Layer 4 — Sentiment Dataset
// ============================================================
// One fully tokenised, padded example plus its supervision
// target, ready for the batcher. Implements Burn's Dataset trait
// so the DataLoader can index into it.
//
// Regression targets are stored already NORMALISED to [0, 1]
// using each dimension's declared range, in dimension order.

use anyhow::Result;
use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;

use crate::data::encoding::encode_text;
use crate::domain::error::ScorerError;
use crate::domain::example::{Example, Label, TaskMode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Target {
    Class(usize),
    Scores(Vec<f32>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentItem {
    pub text:           String,
    pub input_ids:      Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub target:         Target,
}

/// Convert a domain label into a training target for `mode`.
pub fn target_for(label: &Label, mode: &TaskMode) -> Result<Target, ScorerError> {
    mode.validate_label(label).map_err(ScorerError::Data)?;
    match (label, mode) {
        (Label::Class(c), TaskMode::Classification { .. }) => Ok(Target::Class(*c)),
        (Label::Scores(v), TaskMode::Regression { dimensions }) => Ok(Target::Scores(
            v.iter()
                .zip(dimensions)
                .map(|(x, d)| d.normalize(*x) as f32)
                .collect(),
        )),
        _ => Err(ScorerError::Data("label kind does not match task mode".into())),
    }
}

#[derive(Debug, Clone, Default)]
pub struct SentimentDataset {
    items: Vec<SentimentItem>,
}

impl SentimentDataset {
    pub fn new(items: Vec<SentimentItem>) -> Self {
        Self { items }
    }

    /// Tokenise examples into items. Examples whose label does not
    /// fit `mode` are skipped with a warning.
    pub fn from_examples(
        examples:    &[Example],
        tokenizer:   &Tokenizer,
        mode:        &TaskMode,
        max_seq_len: usize,
    ) -> Result<Self> {
        let mut items = Vec::with_capacity(examples.len());
        for ex in examples {
            let target = match target_for(&ex.label, mode) {
                Ok(t)  => t,
                Err(e) => {
                    tracing::warn!("Skipping example: {e}");
                    continue;
                }
            };
            let enc = encode_text(tokenizer, &ex.text, max_seq_len)?;
            items.push(SentimentItem {
                text:           ex.text.clone(),
                input_ids:      enc.input_ids,
                attention_mask: enc.attention_mask,
                target,
            });
        }
        Ok(Self { items })
    }

    pub fn sample_count(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[SentimentItem] {
        &self.items
    }
}

impl Dataset<SentimentItem> for SentimentDataset {
    fn get(&self, index: usize) -> Option<SentimentItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dimension::DimensionSpec;

    #[test]
    fn test_regression_targets_are_normalised() {
        let mode = TaskMode::Regression {
            dimensions: vec![
                DimensionSpec::new("valence", -1.0, 1.0),
                DimensionSpec::new("anxiety", 0.0, 21.0),
            ],
        };
        let t = target_for(&Label::Scores(vec![0.0, 21.0]), &mode).unwrap();
        assert_eq!(t, Target::Scores(vec![0.5, 1.0]));
    }

    #[test]
    fn test_mismatched_label_is_data_error() {
        let err = target_for(&Label::Scores(vec![0.1]), &TaskMode::sentiment()).unwrap_err();
        assert!(matches!(err, ScorerError::Data(_)));
    }
}
