//! The two-stage training pipeline: load data, fine-tune the language
//! model, transfer its encoder, fine-tune the classifier, report.

use std::path::{Path, PathBuf};

use anyhow::Context;
use textfit_core::data::ClasItem;
use textfit_core::{
    ClasDataBunch, ClassificationInterpretation, ColumnSpec, EpochMetrics, LanguageModelLearner,
    LmDataBunch, Splits, TextClassifierLearner, TextDataset, Tokenizer, TrainConfig,
};

/// Encoder name used by `train`.
pub const LANGUAGE_MODEL_NAME: &str = "languagemodel_encoder";
/// Encoder name used by `train-random-split`.
pub const RANDOM_SPLIT_ENCODER_NAME: &str = "textclassifier_encoder";
/// File name of the exported classifier inside `models_dir`.
pub const TEXT_MODEL_NAME: &str = "textclassifier.safetensors";
/// Samples per slice when building the final confusion matrix.
pub const CONFUSION_SLICE_SIZE: usize = 10;
/// Rows shown in the sample prediction table.
pub const SAMPLE_ROWS: usize = 5;

/// How rows are assigned to train / validation / test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SplitMode {
    /// Use the `set` column.
    ByColumn,
    /// Shuffle and hold out a fraction for validation.
    Random { valid_pct: f64, seed: u64 },
}

/// Both data bunches, sharing one vocabulary.
#[derive(Debug, Clone)]
pub struct Data {
    pub lm: LmDataBunch,
    pub clas: ClasDataBunch,
}

/// Read and split a CSV, then build the language model and classifier data.
pub fn load_data(
    path: &Path,
    columns: ColumnSpec,
    mode: SplitMode,
    config: &TrainConfig,
) -> anyhow::Result<Data> {
    let dataset = TextDataset::from_csv(path, columns)
        .with_context(|| format!("failed to read dataset {}", path.display()))?;
    let splits = match mode {
        SplitMode::ByColumn => Splits::by_column(dataset)?,
        SplitMode::Random { valid_pct, seed } => Splits::random(dataset, valid_pct, seed)?,
    };

    let tokenizer = Tokenizer::new();
    let lm = LmDataBunch::from_splits(
        &splits,
        &tokenizer,
        config.max_vocab,
        config.min_freq,
        config.lm_batch_size,
        config.bptt,
    );
    let clas = ClasDataBunch::from_splits(
        &splits,
        &tokenizer,
        lm.vocab.clone(),
        config.clas_batch_size,
        config.max_len,
    )?;
    Ok(Data { lm, clas })
}

/// Output of [`train`].
pub struct Trained {
    pub learner: TextClassifierLearner,
    pub lm_history: Vec<EpochMetrics>,
    pub clas_history: Vec<EpochMetrics>,
    pub encoder_path: PathBuf,
}

/// Fine-tune the language model, save its encoder as `encoder_name`, then
/// fine-tune a classifier on top of it.
pub fn train(data: Data, config: &TrainConfig, encoder_name: &str) -> anyhow::Result<Trained> {
    let mut lm = LanguageModelLearner::new(data.lm, config, config.drop_mult)?;
    tracing::info!(epochs = config.lm_epochs, lr = config.lm_lr, "fine-tuning language model");
    let lm_history = lm.fit_one_cycle(config.lm_epochs, config.lm_lr)?;
    let encoder_path = lm.save_encoder(encoder_name)?;

    let mut learner = TextClassifierLearner::new(data.clas, config, config.drop_mult)?;
    learner
        .load_encoder(encoder_name)
        .with_context(|| format!("failed to load encoder {}", encoder_path.display()))?;
    tracing::info!(epochs = config.clas_epochs, lr = config.clas_lr, "fine-tuning classifier");
    let clas_history = learner.fit_one_cycle(config.clas_epochs, config.clas_lr)?;

    Ok(Trained {
        learner,
        lm_history,
        clas_history,
        encoder_path,
    })
}

/// Print the confusion matrix, most confused pairs, and sample predictions
/// on the held-out split (test if it has rows, otherwise validation).
/// Returns `None` when there is nothing to evaluate.
pub fn show_results(
    learner: &TextClassifierLearner,
) -> anyhow::Result<Option<ClassificationInterpretation>> {
    let data = learner.data();
    let split = data.held_out();
    let items: &[ClasItem] = data.items(split);
    if items.is_empty() {
        tracing::warn!("no held-out rows; skipping results");
        return Ok(None);
    }

    let preds = learner.get_preds(split)?;
    let interp = ClassificationInterpretation::from_preds(data.classes.clone(), preds)
        .with_slice_size(CONFUSION_SLICE_SIZE);
    tracing::info!(%split, samples = items.len(), accuracy = interp.accuracy(), "evaluated");

    println!("Confusion matrix ({split}):");
    println!("{interp}");
    let confused = interp.most_confused(1);
    if !confused.is_empty() {
        println!("Most confused (actual, predicted, count):");
        for (actual, predicted, count) in confused.iter().take(SAMPLE_ROWS) {
            println!("  {actual} -> {predicted}: {count}");
        }
        println!();
    }
    let texts: Vec<&str> = items.iter().map(|item| item.text.as_str()).collect();
    interp.show_results(&texts, SAMPLE_ROWS);
    Ok(Some(interp))
}
