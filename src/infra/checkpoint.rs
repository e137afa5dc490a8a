// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores module weights and the JSON side-files that
// let another process rebuild the exact same architecture.
//
// Directory layout:
//   checkpoints/
//     best_model.mpk.gz    ← overwritten whenever val loss strictly improves
//     final_model.mpk.gz   ← written once at the end of a run
//     encoder.mpk.gz       ← frozen encoder weights
//     train_config.json    ← architecture + task mode
//     best_params.json     ← search result, name → value
//     tokenizer.json       ← see tokenizer_store.rs
//
// Weights use NamedMpkGzFileRecorder with FullPrecisionSettings:
// MessagePack + gzip, and f32 parameters stay f32 on disk so a
// loaded model reproduces the saved model's scores exactly.
// Loading fails if the architecture does not match.
//
// Reference: Burn Book §5 (Records and Checkpointing)
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
};
use serde::{de::DeserializeOwned, Serialize};

pub const BEST_MODEL:  &str = "best_model";
pub const FINAL_MODEL: &str = "final_model";
pub const ENCODER:     &str = "encoder";

const CONFIG_FILE:      &str = "train_config.json";
const BEST_PARAMS_FILE: &str = "best_params.json";

type WeightRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

/// Manages every file stored under one checkpoint directory.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// The directory is created on first write, so an unwritable
    /// path only surfaces when something is actually saved.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", self.dir.display()))
    }

    /// Path of a weights file without the extension the recorder adds.
    fn weights_stem(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn has_weights(&self, name: &str) -> bool {
        self.dir.join(format!("{name}.mpk.gz")).exists()
    }

    /// Save any module's parameters as `{dir}/{name}.mpk.gz`.
    pub fn save_module<B: Backend, M: Module<B>>(&self, module: &M, name: &str) -> Result<()> {
        self.ensure_dir()?;
        let path = self.weights_stem(name);
        WeightRecorder::new()
            .record(module.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;
        tracing::debug!("Saved weights '{}'", path.display());
        Ok(())
    }

    /// Load `{dir}/{name}.mpk.gz` into a freshly built module of the
    /// same architecture.
    pub fn load_module<B: Backend, M: Module<B>>(
        &self,
        module: M,
        name:   &str,
        device: &B::Device,
    ) -> Result<M> {
        let path = self.weights_stem(name);
        let record = WeightRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}'. Have you trained the model first?",
                    path.display())
            })?;
        Ok(module.load_record(record))
    }

    /// Load weights from an explicit record path, e.g. `--encoder-weights`.
    /// The `.mpk.gz` suffix is optional.
    pub fn load_module_from<B: Backend, M: Module<B>>(
        module: M,
        path:   &Path,
        device: &B::Device,
    ) -> Result<M> {
        let raw  = path.to_string_lossy();
        let stem = PathBuf::from(raw.strip_suffix(".mpk.gz").unwrap_or(&raw));
        let record = WeightRecorder::new()
            .load(stem.clone(), device)
            .with_context(|| format!("Cannot load weights '{}'", stem.display()))?;
        Ok(module.load_record(record))
    }

    // ── JSON side-files ───────────────────────────────────────────────────────

    pub fn save_json<T: Serialize>(&self, file_name: &str, value: &T) -> Result<PathBuf> {
        self.ensure_dir()?;
        let path = self.dir.join(file_name);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::debug!("Wrote '{}'", path.display());
        Ok(path)
    }

    pub fn load_json<T: DeserializeOwned>(&self, file_name: &str) -> Result<T> {
        let path = self.dir.join(file_name);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed JSON in '{}'", path.display()))
    }

    /// Saved before training starts so inference can rebuild the model.
    pub fn save_config<T: Serialize>(&self, cfg: &T) -> Result<()> {
        self.save_json(CONFIG_FILE, cfg).map(|_| ())
    }

    pub fn load_config<T: DeserializeOwned>(&self) -> Result<T> {
        self.load_json(CONFIG_FILE).with_context(|| {
            "Missing or unreadable train_config.json. Run 'train' or 'search' first."
        })
    }

    pub fn save_best_params(&self, params: &BTreeMap<String, f64>) -> Result<PathBuf> {
        self.save_json(BEST_PARAMS_FILE, params)
    }

    pub fn load_best_params(&self) -> Result<BTreeMap<String, f64>> {
        self.load_json(BEST_PARAMS_FILE)
    }
}
