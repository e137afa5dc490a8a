// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs, enums and traits that define what the
// scorer works with. No Burn types, no file I/O.
//
//   example.rs    — Example, Label, TaskMode
//   dimension.rs  — continuous scoring axes and their ranges
//   trial.rs      — hyperparameter trial config / outcome / result
//   prediction.rs — the inference contract
//   error.rs      — the error taxonomy and recovery policy
//   traits.rs     — ExampleSource, Predictor
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

pub mod example;

pub mod dimension;

pub mod trial;

pub mod prediction;

pub mod error;

pub mod traits;
