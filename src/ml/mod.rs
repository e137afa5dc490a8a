// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Every Burn tensor operation in the crate lives here. Other
// layers hand in datasets and configs and get back plain numbers,
// so they stay testable without a GPU.
//
// What's in this layer:
//
//   backend.rs        — wgpu / ndarray choice, generic dispatch
//   encoder.rs        — TextEncoder contract + compact transformer
//                       encoder (frozen during training)
//   feature.rs        — FeatureExtractor: linear → norm → GELU → dropout
//   heads.rs          — DimensionHeads: K ordered H → 128 → 1 regressors
//   refiner.rs        — CrossAttentionRefiner: optional self-attention
//   model.rs          — SentimentModel, OutputMode, Scorer, losses
//   ensemble.rs       — EnsembleCombiner: softmax-weighted members
//
//   schedule.rs       — linear warm-up / linear decay learning rate
//   gradients.rs      — global-norm clipping and gradient rescaling
//   precision.rs      — dynamic loss scaling
//   early_stopping.rs — patience monitor, one per run
//   trainer.rs        — TrainingEngine state machine
//   search.rs         — parameter space, sampler, search controller
//
//   evaluator.rs      — held-out scoring → Layer 7 metrics
//   inferencer.rs     — InferenceContext, predict(text)
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Vaswani et al. (2017) Attention Is All You Need

/// Backend choice and dispatch
pub mod backend;

/// Text encoder contract and transformer implementation
pub mod encoder;

pub mod feature;

pub mod heads;

pub mod refiner;

/// Trainable scorer and its loss
pub mod model;

pub mod ensemble;

pub mod schedule;

pub mod gradients;

pub mod precision;

pub mod early_stopping;

/// Training loop with validation, early stopping and checkpointing
pub mod trainer;

/// Hyperparameter search over bounded training trials
pub mod search;

pub mod evaluator;

/// Inference context: loads nothing itself, predicts from text
pub mod inferencer;
