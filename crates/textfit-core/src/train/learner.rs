//! # Learner core
//!
//! Parameter bookkeeping shared by both learners: layer groups and
//! freezing, AdamW with one-cycle updates, gradient clipping, and
//! checkpoint I/O.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarMap};

use crate::error::{Result, TextfitError};
use crate::train::one_cycle::OneCycleSchedule;

/// Metrics for one epoch of training.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train_loss: f64,
    /// `None` when there is no validation data.
    pub valid_loss: Option<f64>,
    pub accuracy: Option<f64>,
}

impl EpochMetrics {
    /// `exp(valid_loss)`, meaningful for language models.
    pub fn perplexity(&self) -> Option<f64> {
        self.valid_loss.map(f64::exp)
    }
}

impl fmt::Display for EpochMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epoch {:3} | train_loss={:.4}", self.epoch, self.train_loss)?;
        match (self.valid_loss, self.accuracy) {
            (Some(loss), Some(acc)) => write!(f, " valid_loss={loss:.4} accuracy={acc:.4}"),
            _ => write!(f, " (no validation data)"),
        }
    }
}

/// Parameters of a model with their layer groups.
pub struct Learner {
    varmap: VarMap,
    device: Device,
    /// Name prefixes per layer group, input side first.
    layer_groups: Vec<Vec<String>>,
    /// Groups before this index are frozen.
    frozen_to: usize,
    weight_decay: f64,
    clip: Option<f64>,
    models_dir: PathBuf,
}

impl Learner {
    pub fn new(
        varmap: VarMap,
        device: Device,
        layer_groups: Vec<Vec<String>>,
        weight_decay: f64,
        clip: Option<f64>,
        models_dir: PathBuf,
    ) -> Self {
        Self {
            varmap,
            device,
            layer_groups,
            frozen_to: 0,
            weight_decay,
            clip,
            models_dir,
        }
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn n_groups(&self) -> usize {
        self.layer_groups.len()
    }

    /// Freeze every group before `n`. Negative `n` counts from the end.
    pub fn freeze_to(&mut self, n: isize) {
        let len = self.layer_groups.len() as isize;
        let idx = if n < 0 { len + n } else { n };
        self.frozen_to = idx.clamp(0, len) as usize;
        tracing::debug!(frozen_to = self.frozen_to, groups = len, "froze layer groups");
    }

    /// Train only the last layer group.
    pub fn freeze(&mut self) {
        self.freeze_to(-1);
    }

    pub fn unfreeze(&mut self) {
        self.freeze_to(0);
    }

    /// All named variables, sorted by name.
    pub fn named_vars(&self) -> Result<Vec<(String, Var)>> {
        let data = self
            .varmap
            .data()
            .lock()
            .map_err(|_| candle_core::Error::Msg("variable map lock poisoned".into()))?;
        let mut vars: Vec<(String, Var)> =
            data.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        vars.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(vars)
    }

    /// Variables in unfrozen layer groups.
    pub fn trainable_vars(&self) -> Result<Vec<Var>> {
        let prefixes: Vec<&String> = self.layer_groups[self.frozen_to..].iter().flatten().collect();
        Ok(self
            .named_vars()?
            .into_iter()
            .filter(|(name, _)| prefixes.iter().any(|p| name.starts_with(p.as_str())))
            .map(|(_, var)| var)
            .collect())
    }

    /// Fresh AdamW over the trainable variables.
    pub fn optimizer(&self) -> Result<AdamW> {
        let params = ParamsAdamW {
            weight_decay: self.weight_decay,
            ..Default::default()
        };
        Ok(AdamW::new(self.trainable_vars()?, params)?)
    }

    /// Backpropagate `loss` and apply one optimizer step at the scheduled
    /// learning rate and momentum.
    pub fn step(
        &self,
        opt: &mut AdamW,
        loss: &Tensor,
        schedule: &OneCycleSchedule,
        step: usize,
    ) -> Result<()> {
        let (lr, beta1) = schedule.at(step);
        let mut params = opt.params().clone();
        params.lr = lr;
        params.beta1 = beta1;
        opt.set_params(params);

        let mut grads = loss.backward()?;
        if let Some(max_norm) = self.clip {
            let vars = self.trainable_vars()?;
            let mut sq_sum = 0f64;
            for var in &vars {
                if let Some(g) = grads.get(var.as_tensor()) {
                    sq_sum += g.sqr()?.sum_all()?.to_scalar::<f32>()? as f64;
                }
            }
            let norm = sq_sum.sqrt();
            if norm > max_norm {
                let scale = max_norm / (norm + 1e-6);
                for var in &vars {
                    if let Some(g) = grads.remove(var.as_tensor()) {
                        grads.insert(var.as_tensor(), g.affine(scale, 0.0)?);
                    }
                }
            }
        }
        opt.step(&grads)?;
        Ok(())
    }

    fn path(&self, name: &str) -> PathBuf {
        self.models_dir.join(format!("{name}.safetensors"))
    }

    /// Write the variables whose names start with `prefix`.
    pub fn save_prefix(&self, name: &str, prefix: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.models_dir)?;
        let path = self.path(name);
        let tensors: HashMap<String, Tensor> = self
            .named_vars()?
            .into_iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k, v.as_tensor().clone()))
            .collect();
        candle_core::safetensors::save(&tensors, &path)?;
        tracing::info!(path = %path.display(), tensors = tensors.len(), "saved weights");
        Ok(path)
    }

    /// Load tensors from `name` into variables starting with `prefix`.
    /// Every matching variable must be present with the same shape.
    pub fn load_prefix(&self, name: &str, prefix: &str) -> Result<()> {
        let path = self.path(name);
        let tensors = candle_core::safetensors::load(&path, &self.device)?;
        let mut loaded = 0usize;
        for (key, var) in self.named_vars()? {
            if !key.starts_with(prefix) {
                continue;
            }
            let tensor = tensors.get(&key).ok_or_else(|| {
                TextfitError::EncoderMismatch(format!("{} is missing {key}", path.display()))
            })?;
            if tensor.dims() != var.dims() {
                return Err(TextfitError::EncoderMismatch(format!(
                    "{key}: expected shape {:?}, found {:?}",
                    var.dims(),
                    tensor.dims()
                )));
            }
            var.set(tensor)?;
            loaded += 1;
        }
        tracing::info!(path = %path.display(), tensors = loaded, "loaded weights");
        Ok(())
    }

    /// Save every variable.
    pub fn save(&self, name: &str) -> Result<PathBuf> {
        self.save_prefix(name, "")
    }

    /// Restore every variable saved by [`Learner::save`].
    pub fn load(&self, name: &str) -> Result<()> {
        self.load_prefix(name, "")
    }
}

/// Fraction of rows of `logits` (`[n, classes]`) whose argmax equals `targets`.
pub(crate) fn accuracy(logits: &Tensor, targets: &Tensor) -> Result<f64> {
    let hits = logits
        .argmax(candle_core::D::Minus1)?
        .eq(targets)?
        .to_dtype(candle_core::DType::F32)?
        .mean_all()?
        .to_scalar::<f32>()?;
    Ok(hits as f64)
}
