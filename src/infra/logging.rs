// ============================================================
// Layer 6 — Logging Setup
// ============================================================
// One tracing subscriber for the whole process:
//
//   stderr layer  — always on, coloured
//   file layer    — `{log_dir}/train.log`, no ANSI codes, only when
//                   a log directory is given
//
// Both layers share one EnvFilter. RUST_LOG overrides the default
// `sentiment_scorer=info`.

use anyhow::{Context, Result};
use std::{fs, path::Path, sync::Mutex};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "sentiment_scorer=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

pub fn init_tracing(log_dir: Option<&Path>) -> Result<()> {
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    let file_layer = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create log dir '{}'", dir.display()))?;
            let path = dir.join("train.log");
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Cannot open log file '{}'", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter())
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("A tracing subscriber is already installed")?;
    Ok(())
}
