// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends one CSV row per epoch (metrics.csv) and one per search
// trial (trials.csv) so a run can be inspected or plotted later.
// Evaluation errors go to error_analysis.csv via the csv crate,
// since review text needs real quoting.
//
// Example metrics.csv:
//   epoch,train_loss,val_loss,learning_rate,duration_secs,improved
//   1,0.693100,0.684200,0.00001000,12.40,true
//   2,0.612000,0.640300,0.00000800,12.10,true
//
// How to read the metrics:
//   - val_loss rising while train_loss falls → overfitting
//   - improved=false rows are what early stopping counts
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

use crate::analysis::classification::ErrorCase;
use crate::domain::trial::TrialResult;

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The epoch number (starts at 1)
    pub epoch: usize,

    /// Mean training loss over the epoch's batches
    pub train_loss: f64,

    /// Mean validation loss over the epoch's batches
    pub val_loss: f64,

    /// Learning rate at the last optimizer step of the epoch
    pub learning_rate: f64,

    pub duration_secs: f64,

    /// Whether this epoch produced a new best validation loss
    pub improved: bool,
}

fn open_with_header(path: &Path, header: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    // Header only for a new file so runs append to one log
    if !path.exists() {
        let mut f = fs::File::create(path)
            .with_context(|| format!("Cannot create '{}'", path.display()))?;
        writeln!(f, "{header}")?;
        tracing::debug!("Created metrics CSV: '{}'", path.display());
    }
    Ok(())
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .append(true)
        .open(path)
        .with_context(|| format!("Cannot append to '{}'", path.display()))?;
    writeln!(f, "{line}")?;
    Ok(())
}

/// Logs epoch metrics to `{dir}/metrics.csv`.
#[derive(Debug, Clone)]
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let csv_path = dir.as_ref().join("metrics.csv");
        open_with_header(
            &csv_path,
            "epoch,train_loss,val_loss,learning_rate,duration_secs,improved",
        )?;
        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        append_line(
            &self.csv_path,
            &format!(
                "{},{:.6},{:.6},{:.8},{:.2},{}",
                m.epoch, m.train_loss, m.val_loss, m.learning_rate, m.duration_secs, m.improved,
            ),
        )?;
        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_loss={:.4}",
            m.epoch, m.train_loss, m.val_loss,
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

/// Logs search trials to `{dir}/trials.csv`.
#[derive(Debug, Clone)]
pub struct TrialLogger {
    csv_path: PathBuf,
}

impl TrialLogger {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let csv_path = dir.as_ref().join("trials.csv");
        open_with_header(
            &csv_path,
            "trial,status,objective,learning_rate,weight_decay,dropout_rate,batch_size,failure",
        )?;
        Ok(Self { csv_path })
    }

    pub fn log(&self, r: &TrialResult) -> Result<()> {
        // Failure text is free-form; keep it inside one CSV field.
        let failure = r.failure.as_deref().unwrap_or("").replace(['"', '\n', ','], " ");
        append_line(
            &self.csv_path,
            &format!(
                "{},{:?},{:.6},{:.8},{:.6},{:.6},{},{}",
                r.index, r.status, r.objective_value,
                r.config.learning_rate, r.config.weight_decay,
                r.config.dropout_rate, r.config.batch_size,
                failure,
            ),
        )
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

/// Write every misclassified example to `path` (text,predicted,actual),
/// replacing any earlier file.
pub fn write_error_analysis(path: &Path, errors: &[ErrorCase]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Cannot create '{}'", path.display()))?;
    for case in errors {
        writer.serialize(case)?;
    }
    writer.flush()?;
    tracing::info!("Wrote {} misclassified examples to '{}'", errors.len(), path.display());
    Ok(())
}
