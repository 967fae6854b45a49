//! Text classifier: AWD-LSTM encoder with a concat-pooling linear head.

use candle_core::{D, DType, IndexOp, Result, Tensor};
use candle_nn::{Dropout, Linear, Module, VarBuilder};

use crate::config::AwdLstmConfig;
use crate::model::awd_lstm::AwdLstm;

/// Width of the hidden layer in the classification head.
pub const HEAD_HIDDEN: usize = 50;

/// `[last, max, mean]` pooling followed by two linear layers.
pub struct PoolingLinearClassifier {
    drop_in: Dropout,
    lin1: Linear,
    drop_hidden: Dropout,
    lin2: Linear,
}

impl PoolingLinearClassifier {
    pub fn new(emb_sz: usize, n_classes: usize, input_p: f32, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            drop_in: Dropout::new(input_p),
            lin1: candle_nn::linear(3 * emb_sz, HEAD_HIDDEN, vb.pp("lin1"))?,
            drop_hidden: Dropout::new(0.1),
            lin2: candle_nn::linear(HEAD_HIDDEN, n_classes, vb.pp("lin2"))?,
        })
    }

    /// `output` is `[batch, seq_len, emb]`, `ids` the matching left-padded ids.
    pub fn forward(&self, output: &Tensor, ids: &Tensor, pad: u32, train: bool) -> Result<Tensor> {
        let pooled = concat_pool(output, ids, pad)?;
        let x = self.drop_in.forward(&pooled, train)?;
        let x = self.lin1.forward(&x)?.relu()?;
        let x = self.drop_hidden.forward(&x, train)?;
        self.lin2.forward(&x)
    }
}

/// Pool over non-pad positions: last step, max, and mean, concatenated.
pub fn concat_pool(output: &Tensor, ids: &Tensor, pad: u32) -> Result<Tensor> {
    let (_, seq_len, _) = output.dims3()?;
    let mask = ids.ne(pad)?.to_dtype(DType::F32)?.unsqueeze(2)?;
    let lengths = mask.sum(1)?.clamp(1f32, f32::MAX)?;

    let last = output.i((.., seq_len - 1, ..))?;
    let avg = output.broadcast_mul(&mask)?.sum(1)?.broadcast_div(&lengths)?;
    let pad_penalty = mask.affine(1e9, -1e9)?;
    let max = output.broadcast_add(&pad_penalty)?.max(D::Minus2)?;

    Tensor::cat(&[&last, &max, &avg], 1)
}

pub struct TextClassifier {
    encoder: AwdLstm,
    head: PoolingLinearClassifier,
    pad: u32,
    n_classes: usize,
}

impl TextClassifier {
    /// Parameters live under `encoder.` and `head.`.
    pub fn new(
        vocab_size: usize,
        n_classes: usize,
        config: &AwdLstmConfig,
        vb: VarBuilder,
    ) -> Result<Self> {
        Ok(Self {
            encoder: AwdLstm::new(vocab_size, config, vb.pp("encoder"))?,
            head: PoolingLinearClassifier::new(
                config.emb_sz,
                n_classes,
                config.output_p,
                vb.pp("head"),
            )?,
            pad: config.pad_token,
            n_classes,
        })
    }

    pub fn encoder(&self) -> &AwdLstm {
        &self.encoder
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Class logits, `[batch, n_classes]`.
    pub fn forward(&self, ids: &Tensor, train: bool) -> Result<Tensor> {
        let out = self.encoder.forward(ids, None, train)?;
        self.head.forward(out.last(), ids, self.pad, train)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use candle_nn::VarMap;

    #[test]
    fn concat_pool_ignores_padding() {
        let dev = Device::Cpu;
        // batch 1, seq 3, emb 2; first position is padding
        let output = Tensor::new(&[[[100f32, -100.], [1., 2.], [3., 4.]]], &dev).unwrap();
        let ids = Tensor::new(&[[1u32, 5, 6]], &dev).unwrap();
        let pooled: Vec<Vec<f32>> = concat_pool(&output, &ids, 1).unwrap().to_vec2().unwrap();
        assert_eq!(pooled[0].len(), 6);
        assert_eq!(&pooled[0][0..2], &[3., 4.]);
        assert_eq!(&pooled[0][2..4], &[3., 4.]);
        assert_eq!(&pooled[0][4..6], &[2., 3.]);
    }

    #[test]
    fn logits_shape() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let cfg = AwdLstmConfig {
            emb_sz: 4,
            n_hid: 8,
            n_layers: 2,
            ..Default::default()
        };
        let clf = TextClassifier::new(16, 3, &cfg, vb).unwrap();
        let ids = Tensor::new(&[[1u32, 2, 9], [2, 9, 10]], &Device::Cpu).unwrap();
        let logits = clf.forward(&ids, true).unwrap();
        assert_eq!(logits.dims(), &[2, 3]);

        let data = varmap.data().lock().unwrap();
        assert!(data.contains_key("head.lin1.weight"));
        assert!(data.contains_key("head.lin2.bias"));
    }
}
