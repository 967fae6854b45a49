use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};
use textfit_core::TextPredictor;
use tracing_subscriber::EnvFilter;

/// Classify lines from stdin with an exported classifier, one JSON object per line.
#[derive(Debug, Parser)]
#[command(name = "textfit-predict", version)]
struct Args {
    /// Exported classifier
    #[arg(
        short,
        long,
        env = "TEXTFIT_MODEL",
        default_value = "models/textclassifier.safetensors"
    )]
    model: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictOutput {
    pub input: String,
    pub label: Option<String>,
    pub index: Option<usize>,
    pub probs: Vec<f32>,
    pub error: Option<String>,
}

fn predict_line(predictor: &TextPredictor, line: &str) -> PredictOutput {
    match predictor.predict(line) {
        Ok(p) => PredictOutput {
            input: line.to_string(),
            label: Some(p.label),
            index: Some(p.index),
            probs: p.probs,
            error: None,
        },
        Err(e) => {
            tracing::warn!(input = line, error = %e, "prediction failed");
            PredictOutput {
                input: line.to_string(),
                label: None,
                index: None,
                probs: Vec::new(),
                error: Some(e.to_string()),
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let predictor = TextPredictor::load(&args.model)
        .with_context(|| format!("failed to load classifier from {}", args.model.display()))?;
    tracing::debug!(classes = ?predictor.classes(), max_len = predictor.max_len(), "ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let output = predict_line(&predictor, line);
        writeln!(stdout, "{}", serde_json::to_string(&output)?)?;
    }

    Ok(())
}
