// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Four commands are supported:
//   1. `train`    — trains a scorer on a labelled file
//   2. `search`   — hyperparameter search, saves best params
//   3. `evaluate` — held-out metrics for a checkpoint
//   4. `predict`  — loads a checkpoint and scores texts
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

// Declare the commands submodule
pub mod commands;

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, PredictArgs, SearchArgs, TrainArgs};

use crate::domain::prediction::Prediction;
use crate::ml::evaluator::{Evaluation, EvaluationReport};

/// Top-level command line. The Parser derive generates the parsing code.
#[derive(Parser, Debug)]
#[command(
    name = "sentiment-scorer",
    version,
    about = "Train, tune, evaluate and run a sentiment / emotion scorer."
)]
pub struct Cli {
    /// The subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// `--log-dir` of `train` / `search`, where train.log is written.
    pub fn log_dir(&self) -> Option<&Path> {
        match &self.command {
            Commands::Train(a)  => a.model.log_dir.as_deref().map(Path::new),
            Commands::Search(a) => a.model.log_dir.as_deref().map(Path::new),
            Commands::Evaluate(_) | Commands::Predict(_) => None,
        }
    }

    /// Route the subcommand to its use case and print the result.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Search(args)   => run_search(args),
            Commands::Evaluate(args) => run_evaluate(args),
            Commands::Predict(args)  => run_predict(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on '{}'", args.model.data_path);
    let report = TrainUseCase::new(args.into()).execute()?;

    println!(
        "Training complete after {} epochs ({:?}). Best val loss {:.4} at epoch {}.",
        report.epochs_run, report.stop_reason, report.best_val_loss, report.best_epoch,
    );
    if report.skipped_steps > 0 {
        println!("Loss scaler skipped {} optimizer steps.", report.skipped_steps);
    }
    print_evaluation(&report.evaluation);
    Ok(())
}

fn run_search(args: SearchArgs) -> Result<()> {
    use crate::application::search_use_case::SearchUseCase;

    let summary = SearchUseCase::new(args.into()).execute()?;
    match summary.best_trial() {
        Some(best) => {
            println!(
                "Best trial {} of {}: val loss {:.4}",
                best.index, summary.trials.len(), best.objective_value,
            );
            for (name, value) in &best.params {
                println!("  {name:<14} {value:.6}");
            }
        }
        None => println!("All {} trials failed. See trials.csv.", summary.trials.len()),
    }
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let evaluation = EvaluateUseCase::new(args.into()).execute()?;
    print_evaluation(&evaluation);
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let as_json = args.json;
    let texts   = args.texts.clone();
    let predictions = PredictUseCase::new(args.into()).execute()?;

    for (text, p) in texts.iter().zip(&predictions) {
        if as_json {
            println!("{}", serde_json::to_string(p)?);
        } else {
            println!("{}", describe(text, p));
        }
    }
    Ok(())
}

fn describe(text: &str, p: &Prediction) -> String {
    match p.confidence {
        Some(c) => format!("{:<10} ({:.1}%)  {}", p.label, c * 100.0, text),
        None => {
            let scores: Vec<String> = p.scores.iter().map(|(n, v)| format!("{n}={v:.2}")).collect();
            format!("{}  {}", scores.join(" "), text)
        }
    }
}

fn print_evaluation(evaluation: &Evaluation) {
    println!("\nHeld-out loss: {:.4}", evaluation.loss);
    match &evaluation.report {
        EvaluationReport::Classification(c) => {
            println!("Accuracy: {:.2}%  ({} examples)", c.report.accuracy * 100.0, c.report.total);
            println!("{:<14} {:>9} {:>9} {:>9} {:>9} {:>7}", "class", "precision", "recall", "f1", "auc", "support");
            for (m, roc) in c.report.classes.iter().zip(&c.roc) {
                println!(
                    "{:<14} {:>9.3} {:>9.3} {:>9.3} {:>9.3} {:>7}",
                    m.name, m.precision, m.recall, m.f1, roc.auc, m.support,
                );
            }
            println!("Misclassified: {}", evaluation.errors.len());
        }
        EvaluationReport::Regression(r) => {
            println!("Mean normalised MSE: {:.5}  ({} examples)", r.mean_normalized_mse, r.total);
            println!("{:<22} {:>9} {:>9}", "dimension", "mae", "rmse");
            for d in &r.dimensions {
                println!("{:<22} {:>9.3} {:>9.3}", d.name, d.mae, d.rmse);
            }
        }
    }
}
