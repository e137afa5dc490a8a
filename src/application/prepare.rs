// ============================================================
// Layer 2 — Data Preparation
// ============================================================
// The part of the pipeline shared by `train`, `search` and
// `evaluate`:
//
//   file → examples → clean → split → balance → tokenizer → datasets
//
// Every step is seeded from TrainConfig::seed, so `evaluate` can
// rebuild exactly the validation split a run was scored on.

use std::{path::Path, sync::Arc};

use anyhow::Result;
use burn::prelude::*;
use tokenizers::Tokenizer;

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    balancer::{balance_by_downsampling, class_counts},
    dataset::SentimentDataset,
    loader::source_for_path,
    preprocessor::Preprocessor,
    splitter::{split_train_val, stratified_split},
};
use crate::domain::{error::ScorerError, example::Example};
use crate::infra::{
    checkpoint::{CheckpointManager, ENCODER},
    tokenizer_store::{id_space, TokenizerStore},
};
use crate::ml::encoder::TransformerEncoder;

pub struct PreparedData {
    pub tokenizer: Tokenizer,
    pub train:     Arc<SentimentDataset>,
    pub val:       Arc<SentimentDataset>,
}

/// Load `cfg.data_path` and drop rows whose cleaned text is empty.
pub fn load_clean_examples(cfg: &TrainConfig) -> Result<Vec<Example>> {
    let source = source_for_path(&cfg.data_path, &cfg.text_column, cfg.label_columns.clone());
    let raw    = source.load_examples(&cfg.task)?;
    let total  = raw.len();

    let cleaner = Preprocessor::new();
    let examples: Vec<Example> = raw
        .into_iter()
        .filter_map(|ex| cleaner.clean_nonempty(&ex.text).map(|text| Example::new(text, ex.label)))
        .collect();

    if examples.len() < total {
        tracing::warn!("Dropped {} examples with no text left after cleaning", total - examples.len());
    }
    if examples.is_empty() {
        return Err(ScorerError::Data(format!("no usable examples in '{}'", cfg.data_path)).into());
    }
    Ok(examples)
}

/// Seeded split (stratified for classification), then optional
/// down-sampling of the training side only.
pub fn split_examples(cfg: &TrainConfig, examples: Vec<Example>) -> (Vec<Example>, Vec<Example>) {
    let train_fraction = 1.0 - cfg.val_fraction;
    let classification = cfg.task.is_classification();

    let (train, val) = if classification {
        stratified_split(examples, train_fraction, cfg.seed)
    } else {
        split_train_val(examples, train_fraction, cfg.seed)
    };

    let train = if classification && cfg.balance {
        let before   = train.len();
        let balanced = balance_by_downsampling(train, cfg.seed);
        tracing::info!("Balanced training split: {} → {} examples", before, balanced.len());
        balanced
    } else {
        train
    };

    if classification {
        tracing::info!("Training class counts: {:?}", class_counts(&train));
    }
    tracing::info!("Split: {} train, {} validation", train.len(), val.len());
    (train, val)
}

pub fn prepare_training_data(cfg: &TrainConfig) -> Result<PreparedData> {
    // ── Step 1-2: Examples and split ──────────────────────────────────────────
    let examples     = load_clean_examples(cfg)?;
    let (train, val) = split_examples(cfg, examples);

    // ── Step 3: Tokenizer from the training side only ─────────────────────────
    let texts: Vec<String> = train.iter().map(|e| e.text.clone()).collect();
    let tokenizer = TokenizerStore::new(&cfg.checkpoint_dir).load_or_build(&texts, cfg.vocab_size)?;

    // ── Step 4: Datasets ──────────────────────────────────────────────────────
    let train_set = SentimentDataset::from_examples(&train, &tokenizer, &cfg.task, cfg.max_seq_len)?;
    let val_set   = SentimentDataset::from_examples(&val, &tokenizer, &cfg.task, cfg.max_seq_len)?;

    Ok(PreparedData {
        tokenizer,
        train: Arc::new(train_set),
        val:   Arc::new(val_set),
    })
}

/// Build the frozen encoder, optionally from `cfg.encoder_weights`,
/// and save it next to the checkpoints. Inference cannot run without
/// that file, so a failed save is an error here.
pub fn build_encoder<B: Backend>(
    cfg:       &TrainConfig,
    tokenizer: &Tokenizer,
    ckpt:      &CheckpointManager,
    device:    &B::Device,
) -> Result<TransformerEncoder<B>> {
    let encoder = cfg.encoder_config(id_space(tokenizer)).init::<B>(device)?;
    let encoder = match &cfg.encoder_weights {
        Some(path) => {
            tracing::info!("Loading encoder weights from '{}'", path);
            CheckpointManager::load_module_from(encoder, Path::new(path), device)?
        }
        None => {
            tracing::warn!("No encoder weights given; the frozen encoder is randomly initialised");
            encoder
        }
    };
    ckpt.save_module(&encoder, ENCODER)?;
    Ok(encoder)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::example::Label;
    use std::fs;

    fn config_for(dir: &tempfile::TempDir, body: &str) -> TrainConfig {
        let path = dir.path().join("data.csv");
        fs::write(&path, body).unwrap();
        TrainConfig {
            data_path:      path.to_string_lossy().into_owned(),
            checkpoint_dir: dir.path().join("ckpt").to_string_lossy().into_owned(),
            max_seq_len:    8,
            vocab_size:     50,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_blank_text_rows_are_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config_for(&tmp, "review,label\ngreat!,2\n\"?!...\",0\nbad,0\n");
        let examples = load_clean_examples(&cfg).unwrap();
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].text, "great");
        assert_eq!(examples[1].label, Label::Class(0));
    }

    #[test]
    fn test_no_usable_rows_is_a_data_error() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config_for(&tmp, "review,label\n!!!,1\n");
        let err = load_clean_examples(&cfg).unwrap_err();
        assert!(matches!(err.downcast_ref::<ScorerError>(), Some(ScorerError::Data(_))));
    }

    #[test]
    fn test_split_is_balanced_and_reproducible() {
        let tmp = tempfile::tempdir().unwrap();
        let mut body = String::from("review,label\n");
        for i in 0..20 { body.push_str(&format!("bad {i},0\n")); }
        for i in 0..5  { body.push_str(&format!("good {i},2\n")); }
        let cfg = config_for(&tmp, &body);

        let (train_a, val_a) = split_examples(&cfg, load_clean_examples(&cfg).unwrap());
        let (train_b, val_b) = split_examples(&cfg, load_clean_examples(&cfg).unwrap());
        assert_eq!(val_a, val_b);
        assert_eq!(train_a, train_b);

        let counts = class_counts(&train_a);
        assert_eq!(counts.get(&0), counts.get(&2));
        assert_eq!(val_a.len(), 5);
    }

    #[test]
    fn test_prepare_builds_tokenizer_and_datasets() {
        let tmp = tempfile::tempdir().unwrap();
        let mut body = String::from("review,label\n");
        for i in 0..5 {
            body.push_str(&format!("awful {i},0\nokay {i},1\nlovely {i},2\n"));
        }
        let cfg  = config_for(&tmp, &body);
        let data = prepare_training_data(&cfg).unwrap();
        assert_eq!(data.train.sample_count() + data.val.sample_count(), 15);
        assert!(TokenizerStore::new(&cfg.checkpoint_dir).exists());
        assert!(data.train.items().iter().all(|i| i.input_ids.len() == 8));
    }
}
