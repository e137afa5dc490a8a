// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the four subcommands and all their configurable flags:
//
//   train     fit a scorer (or ensemble) and evaluate it
//   search    random hyperparameter search over short trials
//   evaluate  score a checkpoint on held-out data
//   predict   score one or more texts
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, etc.)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};

use crate::application::{
    evaluate_use_case::EvaluateConfig,
    predict_use_case::PredictConfig,
    search_use_case::SearchConfig,
    train_use_case::TrainConfig,
};
use crate::domain::{dimension::psych_dimensions, example::TaskMode};
use crate::ml::{backend::BackendKind, search::ParamSpace};

/// The top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a scorer on a labelled CSV or JSON file
    Train(TrainArgs),

    /// Search learning rate, dropout and weight decay
    Search(SearchArgs),

    /// Evaluate a trained checkpoint
    Evaluate(EvaluateArgs),

    /// Score texts with a trained checkpoint
    Predict(PredictArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendArg {
    /// GPU through WebGPU
    Wgpu,
    /// CPU only
    Ndarray,
}

impl From<BackendArg> for BackendKind {
    fn from(b: BackendArg) -> Self {
        match b {
            BackendArg::Wgpu    => BackendKind::Wgpu,
            BackendArg::Ndarray => BackendKind::NdArray,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskArg {
    /// One label column holding a class id
    Classification,
    /// One label column per psychological dimension
    Regression,
}

/// Everything that describes the data and the model.
/// Shared by `train` and `search`.
#[derive(Args, Debug)]
pub struct ModelArgs {
    /// Labelled CSV (or .json) file
    #[arg(long, default_value = "data/reviews.csv")]
    pub data_path: String,

    /// CSV column holding the text
    #[arg(long, default_value = "review")]
    pub text_column: String,

    /// CSV label column(s). Regression defaults to one column
    /// per dimension, named after it
    #[arg(long, value_delimiter = ',')]
    pub label_columns: Option<Vec<String>>,

    #[arg(long, value_enum, default_value_t = TaskArg::Classification)]
    pub task: TaskArg,

    /// Number of classes in classification mode
    #[arg(long, default_value_t = 3)]
    pub num_classes: usize,

    /// Class names in id order; defaults to negative,neutral,positive
    /// for three classes
    #[arg(long, value_delimiter = ',')]
    pub class_names: Option<Vec<String>>,

    /// Directory to save checkpoints, tokenizer and reports
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Also write train.log and the metrics CSVs here
    #[arg(long)]
    pub log_dir: Option<String>,

    #[arg(long, value_enum, default_value_t = BackendArg::Wgpu)]
    pub backend: BackendArg,

    /// Maximum number of tokens per input, [CLS] and [SEP] included
    #[arg(long, default_value_t = 128)]
    pub max_seq_len: usize,

    /// Target vocabulary size when a new tokenizer is built
    #[arg(long, default_value_t = 30522)]
    pub vocab_size: usize,

    /// Hidden size shared by the encoder and the scorer
    #[arg(long, default_value_t = 256)]
    pub hidden_size: usize,

    /// Encoder attention heads; hidden_size must be divisible by it
    #[arg(long, default_value_t = 8)]
    pub num_heads: usize,

    #[arg(long, default_value_t = 4)]
    pub num_layers: usize,

    /// Inner dimension of the encoder feed-forward network
    #[arg(long, default_value_t = 1024)]
    pub d_ff: usize,

    /// Encoder record to start from (frozen during training)
    #[arg(long)]
    pub encoder_weights: Option<String>,

    /// Heads of the optional self-attention refiner
    #[arg(long)]
    pub refiner_heads: Option<usize>,

    /// Fraction of examples held out for validation
    #[arg(long, default_value_t = 0.2)]
    pub val_fraction: f64,

    /// Keep every training example instead of down-sampling to the
    /// minority class
    #[arg(long)]
    pub no_balance: bool,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Background data loader threads
    #[arg(long, default_value_t = 2)]
    pub num_workers: usize,
}

impl ModelArgs {
    fn task_mode(&self) -> TaskMode {
        match self.task {
            TaskArg::Regression => TaskMode::Regression { dimensions: psych_dimensions() },
            TaskArg::Classification => match &self.class_names {
                Some(names) => TaskMode::Classification {
                    num_classes: self.num_classes,
                    class_names: names.clone(),
                },
                None if self.num_classes == 3 => TaskMode::sentiment(),
                None => TaskMode::Classification {
                    num_classes: self.num_classes,
                    class_names: Vec::new(),
                },
            },
        }
    }

    /// Base TrainConfig; the optimisation fields keep their defaults.
    fn into_config(self) -> TrainConfig {
        let task = self.task_mode();
        let label_columns = match (&self.label_columns, &task) {
            (Some(cols), _) => cols.clone(),
            (None, TaskMode::Regression { dimensions }) => {
                dimensions.iter().map(|d| d.name.clone()).collect()
            }
            (None, TaskMode::Classification { .. }) => vec!["label".to_string()],
        };
        TrainConfig {
            data_path:       self.data_path,
            text_column:     self.text_column,
            label_columns,
            checkpoint_dir:  self.checkpoint_dir,
            log_dir:         self.log_dir,
            task,
            val_fraction:    self.val_fraction,
            balance:         !self.no_balance,
            seed:            self.seed,
            num_workers:     self.num_workers,
            backend:         self.backend.into(),
            max_seq_len:     self.max_seq_len,
            vocab_size:      self.vocab_size,
            hidden_size:     self.hidden_size,
            num_heads:       self.num_heads,
            num_layers:      self.num_layers,
            d_ff:            self.d_ff,
            encoder_weights: self.encoder_weights,
            refiner_heads:   self.refiner_heads,
            ..TrainConfig::default()
        }
    }
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Number of full passes through the training data
    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    /// Peak learning rate reached after warm-up
    #[arg(long, default_value_t = 1.7e-5)]
    pub lr: f64,

    #[arg(long, default_value_t = 0.0117)]
    pub weight_decay: f64,

    /// Dropout probability in the scorer
    #[arg(long, default_value_t = 0.15)]
    pub dropout: f64,

    /// Fraction of optimizer steps spent warming up
    #[arg(long, default_value_t = 0.1)]
    pub warmup_ratio: f64,

    /// Global gradient-norm clipping threshold
    #[arg(long, default_value_t = 1.0)]
    pub max_grad_norm: f64,

    /// Batches per optimizer step
    #[arg(long, default_value_t = 1)]
    pub accumulation_steps: usize,

    /// Dynamic loss scaling
    #[arg(long)]
    pub mixed_precision: bool,

    /// Bound of the uniform noise added to embeddings; 0 disables it
    #[arg(long, default_value_t = 0.0)]
    pub adversarial_epsilon: f64,

    /// Epochs without improvement before stopping
    #[arg(long, default_value_t = 3)]
    pub patience: usize,

    /// Minimum validation-loss drop that counts as improvement
    #[arg(long, default_value_t = 0.0)]
    pub min_delta: f64,

    /// Wall-clock limit, checked after each epoch
    #[arg(long)]
    pub time_budget_secs: Option<f64>,

    /// Per-dimension loss weights (regression only)
    #[arg(long, value_delimiter = ',')]
    pub dim_weights: Option<Vec<f32>>,

    /// Train this many scorers combined by learned attention
    #[arg(long, default_value_t = 1)]
    pub ensemble_size: usize,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// This is the boundary between Layer 1 and Layer 2 —
/// the application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            epochs:              a.epochs,
            batch_size:          a.batch_size,
            learning_rate:       a.lr,
            weight_decay:        a.weight_decay,
            dropout:             a.dropout,
            warmup_ratio:        a.warmup_ratio,
            max_grad_norm:       a.max_grad_norm,
            accumulation_steps:  a.accumulation_steps,
            mixed_precision:     a.mixed_precision,
            adversarial_epsilon: a.adversarial_epsilon,
            patience:            a.patience,
            min_delta:           a.min_delta,
            time_budget_secs:    a.time_budget_secs,
            dim_weights:         a.dim_weights,
            ensemble_size:       a.ensemble_size,
            ..a.model.into_config()
        }
    }
}

/// All arguments for the `search` command
#[derive(Args, Debug)]
pub struct SearchArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    #[arg(long, default_value_t = 10)]
    pub trials: usize,

    /// Trials trained at the same time
    #[arg(long, default_value_t = 1)]
    pub workers: usize,

    #[arg(long, default_value_t = 3)]
    pub epochs_per_trial: usize,

    #[arg(long, default_value_t = 3)]
    pub trial_patience: usize,

    /// Wall-clock limit per trial; an overrun counts as a failed trial
    #[arg(long)]
    pub trial_time_budget_secs: Option<f64>,
}

impl From<SearchArgs> for SearchConfig {
    fn from(a: SearchArgs) -> Self {
        SearchConfig {
            train:                  a.model.into_config(),
            space:                  ParamSpace::default(),
            num_trials:             a.trials,
            workers:                a.workers,
            epochs_per_trial:       a.epochs_per_trial,
            trial_patience:         a.trial_patience,
            trial_time_budget_secs: a.trial_time_budget_secs,
        }
    }
}

/// All arguments for the `evaluate` command
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Directory where training saved its checkpoints
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Labelled file to evaluate on; defaults to the run's own
    /// validation split
    #[arg(long)]
    pub data_path: Option<String>,

    /// Checkpoint name, e.g. best_model or final_model
    #[arg(long, default_value = "best_model")]
    pub weights: String,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Where evaluation.json and error_analysis.csv go
    #[arg(long)]
    pub output_dir: Option<String>,

    #[arg(long, value_enum, default_value_t = BackendArg::Wgpu)]
    pub backend: BackendArg,
}

impl From<EvaluateArgs> for EvaluateConfig {
    fn from(a: EvaluateArgs) -> Self {
        EvaluateConfig {
            checkpoint_dir: a.checkpoint_dir,
            data_path:      a.data_path,
            weights:        a.weights,
            batch_size:     a.batch_size,
            output_dir:     a.output_dir,
            backend:        a.backend.into(),
        }
    }
}

/// All arguments for the `predict` command
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Texts to score
    #[arg(required = true)]
    pub texts: Vec<String>,

    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, default_value = "best_model")]
    pub weights: String,

    #[arg(long, value_enum, default_value_t = BackendArg::Wgpu)]
    pub backend: BackendArg,

    /// Print one JSON object per text instead of a summary line
    #[arg(long)]
    pub json: bool,
}

impl From<PredictArgs> for PredictConfig {
    fn from(a: PredictArgs) -> Self {
        PredictConfig {
            checkpoint_dir: a.checkpoint_dir,
            weights:        a.weights,
            texts:          a.texts,
            backend:        a.backend.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn parse(args: &[&str]) -> Commands {
        Cli::try_parse_from(args).unwrap().command
    }

    #[test]
    fn test_train_args_reach_config() {
        let Commands::Train(args) = parse(&[
            "sentiment-scorer", "train", "--backend", "ndarray", "--epochs", "4",
            "--ensemble-size", "3", "--no-balance",
        ]) else { panic!("expected train") };
        let cfg: TrainConfig = args.into();
        assert_eq!(cfg.epochs, 4);
        assert_eq!(cfg.ensemble_size, 3);
        assert_eq!(cfg.backend, BackendKind::NdArray);
        assert!(!cfg.balance);
        assert_eq!(cfg.task, TaskMode::sentiment());
    }

    #[test]
    fn test_regression_defaults_label_columns_to_dimensions() {
        let Commands::Train(args) = parse(&["sentiment-scorer", "train", "--task", "regression"])
            else { panic!("expected train") };
        let cfg: TrainConfig = args.into();
        assert_eq!(cfg.label_columns.len(), 10);
        assert_eq!(cfg.label_columns[0], "valence");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_custom_classes() {
        let Commands::Search(args) = parse(&[
            "sentiment-scorer", "search", "--num-classes", "2", "--class-names", "neg,pos",
            "--trials", "5",
        ]) else { panic!("expected search") };
        let cfg: SearchConfig = args.into();
        assert_eq!(cfg.num_trials, 5);
        assert_eq!(cfg.train.task.output_names(), vec!["neg", "pos"]);
    }

    #[test]
    fn test_predict_requires_text() {
        assert!(Cli::try_parse_from(["sentiment-scorer", "predict"]).is_err());
    }
}
