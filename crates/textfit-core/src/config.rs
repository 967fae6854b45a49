//! # Training configuration
//!
//! Hyperparameters for both stages of the recipe. Every field has a default,
//! so a JSON file only needs to name what it overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TextfitError};

/// Architecture and dropout settings for the AWD-LSTM encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwdLstmConfig {
    /// Embedding size, also the output size of the last LSTM layer.
    pub emb_sz: usize,
    /// Hidden size of the inner LSTM layers.
    pub n_hid: usize,
    /// Number of stacked LSTM layers.
    pub n_layers: usize,
    /// Index of the padding token.
    pub pad_token: u32,
    /// Dropout applied to the final encoder output.
    pub output_p: f32,
    /// Dropout between LSTM layers.
    pub hidden_p: f32,
    /// Dropout on the embedded input.
    pub input_p: f32,
    /// Probability of dropping a whole embedding row.
    pub embed_p: f32,
    /// Tie the language model decoder to the embedding matrix.
    pub tie_weights: bool,
}

impl Default for AwdLstmConfig {
    fn default() -> Self {
        Self {
            emb_sz: 400,
            n_hid: 1152,
            n_layers: 3,
            pad_token: 1,
            output_p: 0.1,
            hidden_p: 0.15,
            input_p: 0.25,
            embed_p: 0.02,
            tie_weights: true,
        }
    }
}

impl AwdLstmConfig {
    /// Same architecture with the heavier dropouts used for classification.
    pub fn classifier_defaults(&self) -> Self {
        Self {
            output_p: 0.4,
            hidden_p: 0.3,
            input_p: 0.4,
            embed_p: 0.05,
            ..self.clone()
        }
    }

    /// Scale every dropout probability by `mult`.
    pub fn scaled(&self, mult: f32) -> Self {
        Self {
            output_p: self.output_p * mult,
            hidden_p: self.hidden_p * mult,
            input_p: self.input_p * mult,
            embed_p: self.embed_p * mult,
            ..self.clone()
        }
    }
}

/// Full configuration for a two-stage training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub lm_epochs: usize,
    pub clas_epochs: usize,
    pub lm_lr: f64,
    pub clas_lr: f64,
    pub drop_mult: f32,
    pub lm_batch_size: usize,
    pub clas_batch_size: usize,
    pub bptt: usize,
    /// Longest document, in tokens, fed to the classifier.
    pub max_len: usize,
    pub max_vocab: usize,
    pub min_freq: usize,
    pub weight_decay: f64,
    /// Global gradient norm clip; `None` disables clipping.
    pub clip: Option<f64>,
    pub seed: u64,
    /// Fraction of rows held out for validation in random-split mode.
    pub valid_pct: f64,
    pub models_dir: PathBuf,
    /// Directory with `weights.safetensors` and `vocab.json` of a pretrained LM.
    pub pretrained_dir: Option<PathBuf>,
    pub awd: AwdLstmConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            lm_epochs: 1,
            clas_epochs: 1,
            lm_lr: 1e-2,
            clas_lr: 1e-2,
            drop_mult: 0.5,
            lm_batch_size: 64,
            clas_batch_size: 32,
            bptt: 70,
            max_len: 1400,
            max_vocab: 60_000,
            min_freq: 2,
            weight_decay: 0.01,
            clip: None,
            seed: 42,
            valid_pct: 0.2,
            models_dir: PathBuf::from("models"),
            pretrained_dir: None,
            awd: AwdLstmConfig::default(),
        }
    }
}

impl TrainConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded training config");
        Ok(config)
    }

    /// Check the values that would otherwise fail deep inside training.
    pub fn validate(&self) -> Result<()> {
        if self.lm_batch_size == 0 || self.clas_batch_size == 0 {
            return Err(TextfitError::Config("batch sizes must be positive".into()));
        }
        if self.bptt < 2 {
            return Err(TextfitError::Config(format!(
                "bptt must be at least 2, got {}",
                self.bptt
            )));
        }
        if self.drop_mult < 0.0 {
            return Err(TextfitError::Config("drop_mult must not be negative".into()));
        }
        if !(self.valid_pct > 0.0 && self.valid_pct < 1.0) {
            return Err(TextfitError::Config(format!(
                "valid_pct must be in (0, 1), got {}",
                self.valid_pct
            )));
        }
        if self.awd.n_layers == 0 || self.awd.emb_sz == 0 || self.awd.n_hid == 0 {
            return Err(TextfitError::Config(
                "AWD-LSTM sizes and layer count must be positive".into(),
            ));
        }
        if self.max_vocab == 0 {
            return Err(TextfitError::Config("max_vocab must be positive".into()));
        }
        Ok(())
    }
}
