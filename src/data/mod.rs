// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from a raw labelled file to tensor batches:
//
//   CSV / JSON file
//       │
//       ▼
//   loader          → Example { text, label }, bad labels dropped
//       │
//       ▼
//   preprocessor    → cleaned text, empty rows dropped
//       │
//       ▼
//   splitter        → stratified train / validation split
//       │
//       ▼
//   balancer        → majority classes down-sampled (train only)
//       │
//       ▼
//   encoding        → [CLS] ids [SEP] + padding, attention mask
//       │
//       ▼
//   SentimentDataset → implements Burn's Dataset trait
//       │
//       ▼
//   SentimentBatcher → stacks items into tensor batches
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads labelled examples from CSV or JSON
pub mod loader;

/// Cleans raw text
pub mod preprocessor;

/// Shuffles and splits data into train/validation sets
pub mod splitter;

/// Majority-class down-sampling
pub mod balancer;

/// Fixed-length token framing
pub mod encoding;

/// Implements Burn's Dataset trait for tokenised examples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;
