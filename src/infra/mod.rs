// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by several other layers:
//
//   checkpoint.rs      — model / encoder weights and JSON side-files
//                        (train_config.json, best_params.json)
//                        under one directory
//
//   tokenizer_store.rs — builds a word-level tokenizer from the
//                        training corpus or reloads the saved one,
//                        so training and inference share a vocabulary
//
//   metrics.rs         — metrics.csv (per epoch), trials.csv
//                        (per search trial), error_analysis.csv
//
//   logging.rs         — tracing subscriber: stderr plus an optional
//                        train.log file
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Tokenizer building, saving, and loading
pub mod tokenizer_store;

/// Epoch and trial CSV loggers
pub mod metrics;

/// Tracing subscriber initialisation
pub mod logging;
