//! Language model: AWD-LSTM encoder plus a linear decoder over the vocabulary.

use candle_core::{Result, Tensor};
use candle_nn::rnn::LSTMState;
use candle_nn::{Init, VarBuilder};

use crate::config::AwdLstmConfig;
use crate::model::awd_lstm::AwdLstm;
use crate::model::dropout::RnnDropout;

/// Result of a language model forward pass.
#[derive(Debug, Clone)]
pub struct LmOutput {
    /// `[batch, seq_len, vocab_size]`
    pub logits: Tensor,
    /// Last encoder layer before output dropout.
    pub raw_last: Tensor,
    /// Last encoder layer after output dropout.
    pub dropped_last: Tensor,
    pub state: Vec<LSTMState>,
}

pub struct LanguageModel {
    encoder: AwdLstm,
    output_dp: RnnDropout,
    decoder_weight: Option<Tensor>,
    decoder_bias: Tensor,
    vocab_size: usize,
}

impl LanguageModel {
    /// Parameters live under `encoder.` and `decoder.`.
    pub fn new(vocab_size: usize, config: &AwdLstmConfig, vb: VarBuilder) -> Result<Self> {
        let encoder = AwdLstm::new(vocab_size, config, vb.pp("encoder"))?;
        let dec = vb.pp("decoder");
        let decoder_weight = if config.tie_weights {
            None
        } else {
            Some(dec.get_with_hints(
                (vocab_size, config.emb_sz),
                "weight",
                Init::Uniform { lo: -0.1, up: 0.1 },
            )?)
        };
        let decoder_bias = dec.get_with_hints(vocab_size, "bias", Init::Const(0.0))?;

        Ok(Self {
            encoder,
            output_dp: RnnDropout::new(config.output_p),
            decoder_weight,
            decoder_bias,
            vocab_size,
        })
    }

    pub fn encoder(&self) -> &AwdLstm {
        &self.encoder
    }

    pub fn forward(
        &self,
        ids: &Tensor,
        state: Option<&[LSTMState]>,
        train: bool,
    ) -> Result<LmOutput> {
        let out = self.encoder.forward(ids, state, train)?;
        let raw_last = out.last().clone();
        let dropped_last = self.output_dp.forward(&raw_last, train)?;

        let (bs, seq_len, emb) = dropped_last.dims3()?;
        let weight = self
            .decoder_weight
            .as_ref()
            .unwrap_or_else(|| self.encoder.embedding_weight());
        let logits = dropped_last
            .reshape((bs * seq_len, emb))?
            .matmul(&weight.t()?)?
            .broadcast_add(&self.decoder_bias)?
            .reshape((bs, seq_len, self.vocab_size))?;

        Ok(LmOutput {
            logits,
            raw_last,
            dropped_last,
            state: out.state,
        })
    }
}
