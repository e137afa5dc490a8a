// ============================================================
// Layer 7 — Analysis (pure metric math)
// ============================================================
// Plain Vec<f64> / Vec<usize> in, serialisable reports out.
// The evaluator in Layer 5 turns model outputs into these inputs;
// nothing in this layer knows about Burn.
//
//   classification.rs — report, confusion matrix, error list
//   roc.rs            — one-vs-rest ROC curves and AUC
//   regression.rs     — per-dimension MAE / RMSE

pub mod classification;

pub mod roc;

pub mod regression;
