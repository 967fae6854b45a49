//! # Exported classifiers
//!
//! An exported classifier is a single safetensors file. The tensors are the
//! model weights; the header metadata carries everything else needed to
//! rebuild it:
//!
//! | key       | value                          |
//! |-----------|--------------------------------|
//! | `format`  | [`FORMAT_VERSION`]             |
//! | `config`  | `AwdLstmConfig` as JSON        |
//! | `vocab`   | vocabulary `itos` as JSON list |
//! | `classes` | class labels as JSON list      |
//! | `max_len` | tokens kept per document       |

use std::collections::HashMap;
use std::path::Path;

use candle_core::{D, DType, Device, Tensor, Var};
use candle_nn::VarBuilder;
use safetensors::SafeTensors;
use serde::{Deserialize, Serialize};

use crate::config::AwdLstmConfig;
use crate::error::{Result, TextfitError};
use crate::model::TextClassifier;
use crate::text::{Tokenizer, Vocab};
use crate::train::clas_learner::argmax;

pub const FORMAT_VERSION: &str = "textfit-classifier/1";

/// Write `tensors` plus the metadata table to `path`.
pub(crate) fn write(
    path: &Path,
    tensors: &[(String, Var)],
    config: &AwdLstmConfig,
    vocab: &Vocab,
    classes: &[String],
    max_len: usize,
) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let metadata = HashMap::from([
        ("format".to_string(), FORMAT_VERSION.to_string()),
        ("config".to_string(), serde_json::to_string(config)?),
        ("vocab".to_string(), serde_json::to_string(vocab.itos())?),
        ("classes".to_string(), serde_json::to_string(classes)?),
        ("max_len".to_string(), max_len.to_string()),
    ]);
    let data = tensors.iter().map(|(name, var)| (name.as_str(), var.as_tensor()));
    safetensors::tensor::serialize_to_file(data, &Some(metadata), path)?;
    tracing::info!(
        path = %path.display(),
        tensors = tensors.len(),
        classes = classes.len(),
        "exported classifier"
    );
    Ok(())
}

/// One classification result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub index: usize,
    pub probs: Vec<f32>,
}

/// Inference over an exported classifier.
pub struct TextPredictor {
    tokenizer: Tokenizer,
    vocab: Vocab,
    classes: Vec<String>,
    max_len: usize,
    model: TextClassifier,
    device: Device,
}

impl TextPredictor {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let (_, header) = SafeTensors::read_metadata(&bytes)?;
        let meta = header
            .metadata()
            .as_ref()
            .ok_or_else(|| TextfitError::Export("missing metadata".into()))?;
        let field = |key: &str| {
            meta.get(key)
                .ok_or_else(|| TextfitError::Export(format!("missing metadata key {key:?}")))
        };

        let format = field("format")?;
        if format != FORMAT_VERSION {
            return Err(TextfitError::Export(format!(
                "unsupported format {format:?}, expected {FORMAT_VERSION:?}"
            )));
        }
        let config: AwdLstmConfig = serde_json::from_str(field("config")?)?;
        let vocab = Vocab::from_itos(serde_json::from_str(field("vocab")?)?);
        let classes: Vec<String> = serde_json::from_str(field("classes")?)?;
        if classes.is_empty() {
            return Err(TextfitError::Export("no classes".into()));
        }
        let max_len: usize = field("max_len")?
            .parse()
            .map_err(|e| TextfitError::Export(format!("bad max_len: {e}")))?;

        let device = Device::Cpu;
        let tensors = candle_core::safetensors::load_buffer(&bytes, &device)?;
        let vb = VarBuilder::from_tensors(tensors, DType::F32, &device);
        let model = TextClassifier::new(vocab.len(), classes.len(), &config, vb)?;
        tracing::info!(
            path = %path.display(),
            vocab_size = vocab.len(),
            classes = classes.len(),
            "loaded classifier"
        );

        Ok(Self {
            tokenizer: Tokenizer::new(),
            vocab,
            classes,
            max_len: max_len.max(1),
            model,
            device,
        })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    /// Documents are cut to this many tokens, as in training.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn predict(&self, text: &str) -> Result<Prediction> {
        let mut ids = self.vocab.numericalize(&self.tokenizer.tokenize(text));
        ids.truncate(self.max_len);
        let len = ids.len();
        let x = Tensor::from_vec(ids, (1, len), &self.device)?;
        let logits = self.model.forward(&x, false)?;
        let probs: Vec<f32> = candle_nn::ops::softmax(&logits, D::Minus1)?
            .squeeze(0)?
            .to_vec1()?;
        let index = argmax(&probs);
        Ok(Prediction {
            label: self.classes[index].clone(),
            index,
            probs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainConfig;
    use crate::data::{ClasDataBunch, LmDataBunch, Row, SplitTag, Splits};
    use crate::train::TextClassifierLearner;

    fn learner(dir: &Path, max_len: usize) -> TextClassifierLearner {
        let cfg = TrainConfig {
            clas_batch_size: 2,
            min_freq: 1,
            models_dir: dir.to_path_buf(),
            awd: AwdLstmConfig {
                emb_sz: 8,
                n_hid: 12,
                n_layers: 2,
                ..Default::default()
            },
            ..Default::default()
        };
        let row = |text: &str, label: &str| Row {
            text: text.into(),
            label: label.into(),
            split: None,
        };
        let splits = Splits {
            train: vec![row("Sunny and warm", "weather"), row("Stocks fell", "finance")],
            valid: vec![row("Rain tomorrow", "weather")],
            test: vec![row("Rain and sunny and warm stocks fell tomorrow", "weather")],
        };
        let tok = Tokenizer::new();
        let lm = LmDataBunch::from_splits(&splits, &tok, 100, 1, 2, 4);
        let clas = ClasDataBunch::from_splits(&splits, &tok, lm.vocab, 2, max_len).unwrap();
        TextClassifierLearner::new(clas, &cfg, 0.5).unwrap()
    }

    #[test]
    fn exported_model_predicts_like_learner() {
        let dir = tempfile::tempdir().unwrap();
        let clf = learner(dir.path(), 50);
        let path = clf.export(dir.path().join("out/clf.safetensors")).unwrap();

        let predictor = TextPredictor::load(&path).unwrap();
        assert_eq!(predictor.classes(), &["finance", "weather"]);
        assert_eq!(predictor.vocab(), &clf.data().vocab);

        let expected = clf.get_preds(SplitTag::Valid).unwrap();
        let got = predictor.predict("Rain tomorrow").unwrap();
        assert_eq!(got.probs.len(), 2);
        for (a, b) in got.probs.iter().zip(&expected.probs[0]) {
            assert!((a - b).abs() < 1e-5);
        }
        assert_eq!(got.label, predictor.classes()[got.index]);
    }

    #[test]
    fn exported_model_truncates_like_learner() {
        let dir = tempfile::tempdir().unwrap();
        let clf = learner(dir.path(), 3);
        let path = clf.export(dir.path().join("clf.safetensors")).unwrap();
        let predictor = TextPredictor::load(&path).unwrap();
        assert_eq!(predictor.max_len(), 3);

        let text = &clf.data().test[0].text;
        assert_eq!(clf.data().test[0].ids.len(), 3);
        let expected = clf.get_preds(SplitTag::Test).unwrap();
        let got = predictor.predict(text).unwrap();
        for (a, b) in got.probs.iter().zip(&expected.probs[0]) {
            assert!((a - b).abs() < 1e-5, "{:?} vs {:?}", got.probs, expected.probs[0]);
        }
    }

    #[test]
    fn rejects_plain_safetensors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.safetensors");
        let tensors = HashMap::from([(
            "x".to_string(),
            Tensor::zeros(2, DType::F32, &Device::Cpu).unwrap(),
        )]);
        candle_core::safetensors::save(&tensors, &path).unwrap();
        let err = TextPredictor::load(&path).err().unwrap();
        assert!(matches!(err, TextfitError::Export(_)));
    }
}
