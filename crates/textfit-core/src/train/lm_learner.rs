//! # Language model fine-tuning
//!
//! Trains the AWD-LSTM language model on the corpus with AR/TAR
//! regularization, then saves the encoder for the classifier stage.

use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_nn::rnn::LSTMState;
use candle_nn::{VarBuilder, VarMap};

use crate::config::TrainConfig;
use crate::data::{LmDataBunch, SplitTag};
use crate::error::{Result, TextfitError};
use crate::model::LanguageModel;
use crate::text::Vocab;
use crate::train::learner::{EpochMetrics, Learner, accuracy};
use crate::train::one_cycle::OneCycleSchedule;

/// Activation regularization weight.
pub const AR_ALPHA: f64 = 2.0;
/// Temporal activation regularization weight.
pub const TAR_BETA: f64 = 1.0;

/// File names inside a pretrained model directory.
pub const PRETRAINED_WEIGHTS: &str = "weights.safetensors";
pub const PRETRAINED_VOCAB: &str = "vocab.json";

pub struct LanguageModelLearner {
    data: LmDataBunch,
    model: LanguageModel,
    learner: Learner,
    seed: u64,
}

impl LanguageModelLearner {
    /// Build the model, loading pretrained weights from
    /// `config.pretrained_dir` when it is set. With pretrained weights the
    /// learner starts frozen.
    pub fn new(data: LmDataBunch, config: &TrainConfig, drop_mult: f32) -> Result<Self> {
        let device = Device::Cpu;
        let mut awd = config.awd.scaled(drop_mult);
        awd.pad_token = data.vocab.pad_id();

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = LanguageModel::new(data.vocab.len(), &awd, vb)?;

        let mut groups: Vec<Vec<String>> = (0..awd.n_layers)
            .map(|i| vec![format!("encoder.rnns.{i}.")])
            .collect();
        groups.push(vec!["encoder.embedding.".into(), "decoder.".into()]);

        let learner = Learner::new(
            varmap,
            device,
            groups,
            config.weight_decay,
            config.clip,
            config.models_dir.clone(),
        );
        let mut lm = Self {
            data,
            model,
            learner,
            seed: config.seed,
        };

        if let Some(dir) = &config.pretrained_dir {
            lm.load_pretrained(dir)?;
            lm.learner.freeze();
        }
        tracing::info!(
            vocab_size = lm.data.vocab.len(),
            layers = awd.n_layers,
            pretrained = config.pretrained_dir.is_some(),
            "created language model learner"
        );
        Ok(lm)
    }

    pub fn data(&self) -> &LmDataBunch {
        &self.data
    }

    pub fn model(&self) -> &LanguageModel {
        &self.model
    }

    pub fn learner(&self) -> &Learner {
        &self.learner
    }

    pub fn learner_mut(&mut self) -> &mut Learner {
        &mut self.learner
    }

    /// Copy pretrained weights, remapping embedding rows by token.
    fn load_pretrained(&self, dir: &Path) -> Result<()> {
        let old_vocab = Vocab::load(dir.join(PRETRAINED_VOCAB))?;
        let tensors =
            candle_core::safetensors::load(dir.join(PRETRAINED_WEIGHTS), self.learner.device())?;

        let vocab = &self.data.vocab;
        let mut missing = 0usize;
        let rows: Vec<u32> = vocab
            .itos()
            .iter()
            .map(|tok| {
                old_vocab.id(tok).unwrap_or_else(|| {
                    missing += 1;
                    old_vocab.len() as u32
                })
            })
            .collect();
        let rows = Tensor::new(rows.as_slice(), self.learner.device())?;

        for (name, var) in self.learner.named_vars()? {
            let Some(src) = tensors.get(&name) else {
                tracing::warn!(%name, "pretrained weights lack tensor; keeping initialization");
                continue;
            };
            let value = if name == "encoder.embedding.weight" || name == "decoder.bias" {
                match_embeds(src, &rows)?
            } else {
                src.clone()
            };
            if value.dims() != var.dims() {
                return Err(TextfitError::EncoderMismatch(format!(
                    "pretrained {name}: expected shape {:?}, found {:?}",
                    var.dims(),
                    value.dims()
                )));
            }
            var.set(&value)?;
        }
        tracing::info!(
            dir = %dir.display(),
            new_tokens = missing,
            "loaded pretrained language model"
        );
        Ok(())
    }

    /// Language model loss: cross-entropy plus AR and TAR penalties.
    fn loss(
        &self,
        x: &Tensor,
        y: &Tensor,
        state: Option<&[LSTMState]>,
    ) -> Result<(Tensor, Tensor, Vec<LSTMState>)> {
        let out = self.model.forward(x, state, true)?;
        let (bs, seq_len, vocab) = out.logits.dims3()?;
        let ce = candle_nn::loss::cross_entropy(
            &out.logits.reshape((bs * seq_len, vocab))?,
            &y.flatten_all()?,
        )?;

        let mut loss = (&ce + out.dropped_last.sqr()?.mean_all()?.affine(AR_ALPHA, 0.0)?)?;
        if seq_len > 1 {
            let raw = &out.raw_last;
            let diff = (raw.narrow(1, 1, seq_len - 1)? - raw.narrow(1, 0, seq_len - 1)?)?;
            loss = (loss + diff.sqr()?.mean_all()?.affine(TAR_BETA, 0.0)?)?;
        }
        Ok((loss, ce, out.state))
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
            let mut state: Option<Vec<LSTMState>> = None;
            let mut total = 0f64;
            for batch in &batches {
                let (loss, ce, next) = self.loss(&batch.x, &batch.y, state.as_deref())?;
                self.learner.step(&mut opt, &loss, &schedule, step)?;
                total += ce.to_scalar::<f32>()? as f64;
                state = Some(next);
                step += 1;
            }

            let valid = self.validate(SplitTag::Valid)?;
            let metrics = EpochMetrics {
                epoch: epoch + 1,
                train_loss: total / batches.len() as f64,
                valid_loss: valid.map(|(loss, _)| loss),
                accuracy: valid.map(|(_, acc)| acc),
            };
            tracing::info!(
                epoch = metrics.epoch,
                train_loss = metrics.train_loss,
                valid_loss = ?metrics.valid_loss,
                accuracy = ?metrics.accuracy,
                perplexity = ?metrics.perplexity(),
                "language model epoch"
            );
            history.push(metrics);
        }
        Ok(history)
    }

    /// Token-weighted loss and next-token accuracy over a split, or `None`
    /// when the split has no batches.
    pub fn validate(&self, split: SplitTag) -> Result<Option<(f64, f64)>> {
        let batches = self.data.batches(split, None, self.learner.device())?;
        let mut state: Option<Vec<LSTMState>> = None;
        let (mut loss_sum, mut acc_sum, mut tokens) = (0f64, 0f64, 0usize);
        for batch in &batches {
            let out = self.model.forward(&batch.x, state.as_deref(), false)?;
            let (bs, seq_len, vocab) = out.logits.dims3()?;
            let logits = out.logits.reshape((bs * seq_len, vocab))?;
            let targets = batch.y.flatten_all()?;
            let n = bs * seq_len;
            let loss = candle_nn::loss::cross_entropy(&logits, &targets)?.to_scalar::<f32>()?;
            loss_sum += loss as f64 * n as f64;
            acc_sum += accuracy(&logits, &targets)? * n as f64;
            tokens += n;
            state = Some(out.state);
        }
        if tokens == 0 {
            return Ok(None);
        }
        Ok(Some((loss_sum / tokens as f64, acc_sum / tokens as f64)))
    }

    /// Save the `encoder.` weights and the vocabulary under `models_dir`.
    pub fn save_encoder(&self, name: &str) -> Result<PathBuf> {
        let path = self.learner.save_prefix(name, "encoder.")?;
        self.data
            .vocab
            .save(self.learner.models_dir().join(format!("{name}.vocab.json")))?;
        Ok(path)
    }
}

/// Reorder rows of `src` (`[old_vocab, ...]`) by `rows`. An index equal to
/// `old_vocab` selects the mean row.
fn match_embeds(src: &Tensor, rows: &Tensor) -> Result<Tensor> {
    let mean = src.mean_keepdim(0)?;
    let extended = Tensor::cat(&[src, &mean], 0)?;
    Ok(extended.index_select(rows, 0)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AwdLstmConfig;
    use crate::data::{Row, Splits};
    use crate::text::Tokenizer;
    use std::collections::HashMap;

    fn tiny_config(dir: &Path) -> TrainConfig {
        TrainConfig {
            lm_batch_size: 2,
            bptt: 5,
            min_freq: 1,
            models_dir: dir.to_path_buf(),
            awd: AwdLstmConfig {
                emb_sz: 8,
                n_hid: 12,
                n_layers: 2,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn bunch(config: &TrainConfig) -> LmDataBunch {
        let row = |text: &str| Row {
            text: text.into(),
            label: "x".into(),
            split: None,
        };
        let splits = Splits {
            train: vec![
                row("the cat sat on the mat"),
                row("the dog sat on the log"),
                row("a cat and a dog"),
            ],
            valid: vec![row("the cat and the dog sat")],
            test: Vec::new(),
        };
        LmDataBunch::from_splits(
            &splits,
            &Tokenizer::new(),
            config.max_vocab,
            config.min_freq,
            config.lm_batch_size,
            config.bptt,
        )
    }

    #[test]
    fn fit_reports_each_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = tiny_config(dir.path());
        let mut lm = LanguageModelLearner::new(bunch(&cfg), &cfg, 0.5).unwrap();
        let history = lm.fit_one_cycle(2, 1e-2).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].epoch, 2);
        assert!(history.iter().all(|m| m.train_loss.is_finite()));
        assert!(history[0].perplexity().unwrap() > 1.0);
    }

    #[test]
    fn save_encoder_writes_weights_and_vocab() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = tiny_config(dir.path());
        let lm = LanguageModelLearner::new(bunch(&cfg), &cfg, 0.5).unwrap();
        let path = lm.save_encoder("enc").unwrap();
        assert!(path.exists());
        assert!(dir.path().join("enc.vocab.json").exists());

        let tensors = candle_core::safetensors::load(&path, &Device::Cpu).unwrap();
        assert!(tensors.keys().all(|k| k.starts_with("encoder.")));
        assert!(tensors.contains_key("encoder.embedding.weight"));
    }

    #[test]
    fn match_embeds_uses_mean_for_new_tokens() {
        let src = Tensor::new(&[[1f32, 2.], [3., 4.]], &Device::Cpu).unwrap();
        let rows = Tensor::new(&[1u32, 2, 0], &Device::Cpu).unwrap();
        let out: Vec<Vec<f32>> = match_embeds(&src, &rows).unwrap().to_vec2().unwrap();
        assert_eq!(out, vec![vec![3., 4.], vec![2., 3.], vec![1., 2.]]);
    }

    #[test]
    fn pretrained_weights_freeze_the_body() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = tiny_config(dir.path());
        let data = bunch(&cfg);

        // write every tensor of a fresh model as the pretrained checkpoint
        let source = LanguageModelLearner::new(data.clone(), &cfg, 0.5).unwrap();
        let pre_dir = dir.path().join("pretrained");
        std::fs::create_dir_all(&pre_dir).unwrap();
        let tensors: HashMap<String, Tensor> = source
            .learner()
            .named_vars()
            .unwrap()
            .into_iter()
            .map(|(k, v)| (k, v.as_tensor().clone()))
            .collect();
        candle_core::safetensors::save(&tensors, pre_dir.join(PRETRAINED_WEIGHTS)).unwrap();
        data.vocab.save(pre_dir.join(PRETRAINED_VOCAB)).unwrap();

        let cfg = TrainConfig {
            pretrained_dir: Some(pre_dir),
            ..cfg
        };
        let lm = LanguageModelLearner::new(data, &cfg, 0.5).unwrap();
        let trainable = lm.learner().trainable_vars().unwrap();
        // embedding and decoder bias only
        assert_eq!(trainable.len(), 2);

        let copied = lm.model().encoder().embedding_weight();
        let source_weight = source.model().encoder().embedding_weight();
        assert_eq!(
            copied.to_vec2::<f32>().unwrap(),
            source_weight.to_vec2::<f32>().unwrap()
        );
    }
}
