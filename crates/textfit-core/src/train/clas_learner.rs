//! # Classifier fine-tuning
//!
//! Trains the pooling classifier on top of a fine-tuned language model
//! encoder.

use std::path::{Path, PathBuf};

use candle_core::{D, DType, Device};
use candle_nn::{VarBuilder, VarMap};

use crate::config::{AwdLstmConfig, TrainConfig};
use crate::data::{ClasDataBunch, SplitTag};
use crate::error::{Result, TextfitError};
use crate::export;
use crate::model::TextClassifier;
use crate::text::Vocab;
use crate::train::learner::{EpochMetrics, Learner, accuracy};
use crate::train::one_cycle::OneCycleSchedule;

/// Predictions over one split, in split order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preds {
    /// Softmax probabilities, one row per sample.
    pub probs: Vec<Vec<f32>>,
    pub targets: Vec<u32>,
    /// Per-sample cross-entropy.
    pub losses: Vec<f32>,
}

impl Preds {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Index of the most probable class per sample.
    pub fn predicted(&self) -> Vec<u32> {
        self.probs.iter().map(|p| argmax(p) as u32).collect()
    }
}

pub(crate) fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
            if v > best.1 { (i, v) } else { best }
        })
        .0
}

pub struct TextClassifierLearner {
    data: ClasDataBunch,
    model: TextClassifier,
    learner: Learner,
    awd: AwdLstmConfig,
    seed: u64,
}

impl TextClassifierLearner {
    pub fn new(data: ClasDataBunch, config: &TrainConfig, drop_mult: f32) -> Result<Self> {
        let device = Device::Cpu;
        let mut awd = config.awd.classifier_defaults().scaled(drop_mult);
        awd.pad_token = data.vocab.pad_id();

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = TextClassifier::new(data.vocab.len(), data.num_classes(), &awd, vb)?;

        let mut groups = vec![vec!["encoder.embedding.".to_string()]];
        groups.extend((0..awd.n_layers).map(|i| vec![format!("encoder.rnns.{i}.")]));
        groups.push(vec!["head.".into()]);

        let learner = Learner::new(
            varmap,
            device,
            groups,
            config.weight_decay,
            config.clip,
            config.models_dir.clone(),
        );
        tracing::info!(
            classes = data.num_classes(),
            vocab_size = data.vocab.len(),
            "created classifier learner"
        );
        Ok(Self {
            data,
            model,
            learner,
            awd,
            seed: config.seed,
        })
    }

    pub fn data(&self) -> &ClasDataBunch {
        &self.data
    }

    pub fn model(&self) -> &TextClassifier {
        &self.model
    }

    pub fn learner(&self) -> &Learner {
        &self.learner
    }

    pub fn learner_mut(&mut self) -> &mut Learner {
        &mut self.learner
    }

    /// Load encoder weights written by
    /// [`LanguageModelLearner::save_encoder`](crate::train::LanguageModelLearner::save_encoder)
    /// and freeze everything but the head.
    pub fn load_encoder(&mut self, name: &str) -> Result<()> {
        let dir = self.learner.models_dir();
        let vocab = &self.data.vocab;

        let vocab_path = dir.join(format!("{name}.vocab.json"));
        if vocab_path.exists() {
            let saved = Vocab::load(&vocab_path)?;
            if &saved != vocab {
                return Err(TextfitError::VocabMismatch {
                    expected: vocab.len(),
                    found: saved.len(),
                });
            }
        } else {
            tracing::warn!(path = %vocab_path.display(), "encoder vocabulary not found; checking shapes only");
        }

        let weights = dir.join(format!("{name}.safetensors"));
        let tensors = candle_core::safetensors::load(&weights, self.learner.device())?;
        if let Some(emb) = tensors.get("encoder.embedding.weight") {
            let rows = emb.dim(0)?;
            if rows != vocab.len() {
                return Err(TextfitError::VocabMismatch {
                    expected: vocab.len(),
                    found: rows,
                });
            }
        }

        self.learner.load_prefix(name, "encoder.")?;
        self.learner.freeze();
        Ok(())
    }

    /// Train for `epochs` epochs under one learning rate cycle.
    pub fn fit_one_cycle(&mut self, epochs: usize, lr_max: f64) -> Result<Vec<EpochMetrics>> {
        let device = self.learner.device().clone();
        let mut batches = self.data.batches(SplitTag::Train, Some(self.seed), &device)?;
        if batches.is_empty() {
            return Err(TextfitError::EmptyDataset {
                split: SplitTag::Train.to_string(),
            });
        }
        let schedule = OneCycleSchedule::new(lr_max, batches.len() * epochs);
        let mut opt = self.learner.optimizer()?;
        let mut step = 0usize;
        let mut history = Vec::with_capacity(epochs);

        for epoch in 0..epochs {
            if epoch > 0 {
                let seed = self.seed.wrapping_add(epoch as u64);
                batches = self.data.batches(SplitTag::Train, Some(seed), &device)?;
            }
            let (mut total, mut samples) = (0f64, 0usize);
            for batch in &batches {
                let logits = self.model.forward(&batch.x, true)?;
                let loss = candle_nn::loss::cross_entropy(&logits, &batch.y)?;
                self.learner.step(&mut opt, &loss, &schedule, step)?;
                let n = batch.indices.len();
                total += loss.to_scalar::<f32>()? as f64 * n as f64;
                samples += n;
                step += 1;
            }

            let valid = self.validate(SplitTag::Valid)?;
            let metrics = EpochMetrics {
                epoch: epoch + 1,
                train_loss: total / samples.max(1) as f64,
                valid_loss: valid.map(|(loss, _)| loss),
                accuracy: valid.map(|(_, acc)| acc),
            };
            tracing::info!(
                epoch = metrics.epoch,
                train_loss = metrics.train_loss,
                valid_loss = ?metrics.valid_loss,
                accuracy = ?metrics.accuracy,
                "classifier epoch"
            );
            history.push(metrics);
        }
        Ok(history)
    }

    /// Sample-weighted loss and accuracy over a split, or `None` when it is empty.
    pub fn validate(&self, split: SplitTag) -> Result<Option<(f64, f64)>> {
        let batches = self.data.batches(split, None, self.learner.device())?;
        let (mut loss_sum, mut acc_sum, mut samples) = (0f64, 0f64, 0usize);
        for batch in &batches {
            let logits = self.model.forward(&batch.x, false)?;
            let n = batch.indices.len();
            let loss = candle_nn::loss::cross_entropy(&logits, &batch.y)?.to_scalar::<f32>()?;
            loss_sum += loss as f64 * n as f64;
            acc_sum += accuracy(&logits, &batch.y)? * n as f64;
            samples += n;
        }
        if samples == 0 {
            return Ok(None);
        }
        Ok(Some((loss_sum / samples as f64, acc_sum / samples as f64)))
    }

    /// Probabilities, targets, and per-sample losses over a split.
    pub fn get_preds(&self, split: SplitTag) -> Result<Preds> {
        let batches = self.data.batches(split, None, self.learner.device())?;
        let mut preds = Preds::default();
        for batch in &batches {
            let logits = self.model.forward(&batch.x, false)?;
            let log_probs = candle_nn::ops::log_softmax(&logits, D::Minus1)?;
            let losses = log_probs
                .gather(&batch.y.unsqueeze(1)?, 1)?
                .squeeze(1)?
                .neg()?;
            preds.probs.extend(log_probs.exp()?.to_vec2::<f32>()?);
            preds.targets.extend(batch.y.to_vec1::<u32>()?);
            preds.losses.extend(losses.to_vec1::<f32>()?);
        }
        tracing::debug!(%split, samples = preds.len(), "collected predictions");
        Ok(preds)
    }

    /// Save a full checkpoint under `models_dir`.
    pub fn save(&self, name: &str) -> Result<PathBuf> {
        self.learner.save(name)
    }

    /// Restore a checkpoint written by [`TextClassifierLearner::save`].
    pub fn load(&self, name: &str) -> Result<()> {
        self.learner.load(name)
    }

    /// Write weights, vocabulary, classes, and architecture to one file.
    pub fn export<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf> {
        let tensors = self.learner.named_vars()?;
        export::write(
            path.as_ref(),
            &tensors,
            &self.awd,
            &self.data.vocab,
            &self.data.classes,
            self.data.max_len,
        )?;
        Ok(path.as_ref().to_path_buf())
    }
}
