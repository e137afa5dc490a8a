// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// one goal per command: train, search, evaluate or predict.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No UI or printing here (that's Layer 1)
//   - No direct file formats (that's Layer 4 and 6)
//   - Only workflow coordination
//
// Each use case implements BackendTask, so the CLI picks wgpu or
// ndarray once and the whole workflow is monomorphised for it.
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Shared steps: examples → split → tokenizer → datasets → encoder
pub mod prepare;

// Rebuilds a finished run from its checkpoint dir
pub mod artifacts;

// The training workflow
pub mod train_use_case;

// Hyperparameter search over short trials
pub mod search_use_case;

// Held-out evaluation of a checkpoint
pub mod evaluate_use_case;

// The inference workflow
pub mod predict_use_case;
