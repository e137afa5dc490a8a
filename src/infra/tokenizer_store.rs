// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Loads `{dir}/tokenizer.json`, or builds a word-level vocabulary
// from the training corpus and writes it in the HuggingFace JSON
// format so `Tokenizer::from_file` can read it back.
//
// In tokenizers 0.15, train_from_files requires Trainer::Model
// to equal ModelWrapper. Writing the JSON directly sidesteps that
// type mismatch entirely.
//
// Special tokens keep BERT ids, which leaves a gap at 2..=100:
//   [PAD]=0  [UNK]=1  [CLS]=101  [SEP]=102  [MASK]=103  words from 104
//
// The embedding table therefore needs `id_space()` rows, not
// `get_vocab_size()` rows.

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use tokenizers::Tokenizer;

use crate::data::preprocessor::Preprocessor;

const FIRST_WORD_ID: usize = 104;
const SPECIAL_TOKENS: [(&str, usize); 5] = [
    ("[PAD]", 0), ("[UNK]", 1), ("[CLS]", 101), ("[SEP]", 102), ("[MASK]", 103),
];

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self) -> PathBuf {
        self.dir.join("tokenizer.json")
    }

    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Load the saved tokenizer, or build one from `texts`.
    pub fn load_or_build(&self, texts: &[String], vocab_size: usize) -> Result<Tokenizer> {
        if self.exists() {
            tracing::info!("Loading existing tokenizer from '{}'", self.path().display());
            self.load()
        } else {
            tracing::info!("Building new tokenizer (vocab_size={})", vocab_size);
            self.build_and_save(texts, vocab_size)
        }
    }

    pub fn load(&self) -> Result<Tokenizer> {
        load_tokenizer(&self.path())
    }

    fn build_and_save(&self, texts: &[String], vocab_size: usize) -> Result<Tokenizer> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;

        let words = build_vocabulary(texts, vocab_size);
        let json  = tokenizer_json(&words);

        let tok_path = self.path();
        std::fs::write(&tok_path, serde_json::to_string_pretty(&json)?)
            .with_context(|| "Cannot write tokenizer JSON")?;

        tracing::info!(
            "Tokenizer built with {} words, saved to '{}'",
            words.len(),
            tok_path.display()
        );
        load_tokenizer(&tok_path)
    }
}

pub fn load_tokenizer(path: &Path) -> Result<Tokenizer> {
    Tokenizer::from_file(path)
        .map_err(|e| anyhow::anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e))
}

/// Number of embedding rows needed to cover every id the tokenizer emits.
pub fn id_space(tokenizer: &Tokenizer) -> usize {
    tokenizer
        .get_vocab(true)
        .values()
        .max()
        .map(|&id| id as usize + 1)
        .unwrap_or(FIRST_WORD_ID)
}

/// Most frequent lowercase words, at most `vocab_size - 5` of them.
/// Ties are broken alphabetically so the same corpus always yields
/// the same ids.
pub fn build_vocabulary(texts: &[String], vocab_size: usize) -> Vec<String> {
    let cleaner = Preprocessor::new();
    let mut freq: HashMap<String, usize> = HashMap::new();
    for text in texts {
        for word in cleaner.clean(text).split_whitespace() {
            *freq.entry(word.to_lowercase()).or_insert(0) += 1;
        }
    }

    let mut words: Vec<(String, usize)> = freq
        .into_iter()
        .filter(|(w, _)| !SPECIAL_TOKENS.iter().any(|(s, _)| s == w))
        .collect();
    words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    words.truncate(vocab_size.saturating_sub(SPECIAL_TOKENS.len()));
    words.into_iter().map(|(w, _)| w).collect()
}

fn tokenizer_json(words: &[String]) -> serde_json::Value {
    let mut vocab = serde_json::Map::new();
    let mut added_tokens = Vec::new();
    for (token, id) in SPECIAL_TOKENS {
        vocab.insert(token.to_string(), serde_json::json!(id));
        added_tokens.push(serde_json::json!({
            "id": id, "content": token, "single_word": false, "lstrip": false,
            "rstrip": false, "normalized": false, "special": true
        }));
    }
    for (offset, word) in words.iter().enumerate() {
        vocab.insert(word.clone(), serde_json::json!(FIRST_WORD_ID + offset));
    }

    serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added_tokens,
        "normalizer": {
            "type": "BertNormalizer",
            "clean_text": true,
            "handle_chinese_chars": true,
            "strip_accents": null,
            "lowercase": true
        },
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": "[UNK]"
        }
    })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_is_frequency_ordered_and_capped() {
        let texts = vec!["good good bad".to_string(), "Good movie, bad ending".to_string()];
        let words = build_vocabulary(&texts, 8);
        assert_eq!(words, vec!["good", "bad", "ending"]);
    }

    #[test]
    fn test_built_tokenizer_encodes_known_and_unknown_words() {
        let tmp   = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(tmp.path());
        let texts = vec!["great film".to_string(), "terrible film".to_string()];
        let tok   = store.load_or_build(&texts, 100).unwrap();
        assert!(store.exists());

        let ids = tok.encode("Film zebra", false).unwrap().get_ids().to_vec();
        assert_eq!(ids, vec![104, 1]);
        assert_eq!(id_space(&tok), 107);

        // second call loads the same file
        let again = store.load_or_build(&[], 100).unwrap();
        assert_eq!(again.encode("great", false).unwrap().get_ids(), tok.encode("great", false).unwrap().get_ids());
    }
}
