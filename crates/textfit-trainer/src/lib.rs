//! # Textfit Trainer
//!
//! Command-line ULMFiT training. `train` splits a CSV by its `set` column
//! and exports the classifier; `train-random-split` splits at random and
//! keeps only the saved encoder.

pub mod cli;
pub mod pipeline;

pub use pipeline::{Data, SplitMode, Trained, load_data, show_results, train};

use anyhow::Context;
use textfit_core::ColumnSpec;
use tracing_subscriber::EnvFilter;

use crate::cli::{ColumnSplitArgs, RandomSplitArgs};
use crate::pipeline::{LANGUAGE_MODEL_NAME, RANDOM_SPLIT_ENCODER_NAME, TEXT_MODEL_NAME};

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Split by the `set` column, train both stages, export the classifier, and
/// report on the test split.
pub fn run_column_split(args: &ColumnSplitArgs) -> anyhow::Result<Trained> {
    let config = args.config()?;
    let columns = ColumnSpec {
        text: args.text_column,
        label: args.label_column,
    };
    let data = load_data(&args.dataset_path, columns, SplitMode::ByColumn, &config)?;
    let trained = train(data, &config, LANGUAGE_MODEL_NAME)?;

    let export_path = config.models_dir.join(TEXT_MODEL_NAME);
    trained
        .learner
        .export(&export_path)
        .with_context(|| format!("failed to export classifier to {}", export_path.display()))?;
    show_results(&trained.learner)?;
    Ok(trained)
}

/// Split at random (label column 0, text column 1), train both stages, and
/// report on the validation split.
pub fn run_random_split(args: &RandomSplitArgs) -> anyhow::Result<Trained> {
    let config = args.config()?;
    let mode = SplitMode::Random {
        valid_pct: config.valid_pct,
        seed: config.seed,
    };
    let data = load_data(&args.dataset_path, ColumnSpec::default(), mode, &config)?;
    let trained = train(data, &config, RANDOM_SPLIT_ENCODER_NAME)?;
    show_results(&trained.learner)?;
    Ok(trained)
}
