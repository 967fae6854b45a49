//! # AWD-LSTM encoder
//!
//! Embedding followed by a stack of LSTMs with variational dropout between
//! layers. The last layer projects back to the embedding size so the
//! language model decoder can share the embedding matrix.

use candle_core::{Result, Tensor};
use candle_nn::rnn::{LSTM, LSTMConfig, LSTMState, RNN};
use candle_nn::{Embedding, Init, VarBuilder};

use crate::config::AwdLstmConfig;
use crate::model::dropout::{RnnDropout, embedding_dropout};

/// Outputs of every LSTM layer, each `[batch, seq_len, hidden]`.
#[derive(Debug, Clone)]
pub struct EncoderOutput {
    /// Layer outputs before inter-layer dropout.
    pub raw: Vec<Tensor>,
    /// Final hidden state of each layer.
    pub state: Vec<LSTMState>,
}

impl EncoderOutput {
    /// Output of the last layer.
    pub fn last(&self) -> &Tensor {
        &self.raw[self.raw.len() - 1]
    }
}

pub struct AwdLstm {
    embedding: Embedding,
    rnns: Vec<LSTM>,
    input_dp: RnnDropout,
    hidden_dp: RnnDropout,
    embed_p: f32,
    config: AwdLstmConfig,
}

impl AwdLstm {
    /// Build the encoder under `vb` (conventionally the `encoder` prefix).
    pub fn new(vocab_size: usize, config: &AwdLstmConfig, vb: VarBuilder) -> Result<Self> {
        let weight = vb.pp("embedding").get_with_hints(
            (vocab_size, config.emb_sz),
            "weight",
            Init::Uniform { lo: -0.1, up: 0.1 },
        )?;
        let embedding = Embedding::new(weight, config.emb_sz);

        let mut rnns = Vec::with_capacity(config.n_layers);
        for layer in 0..config.n_layers {
            let in_dim = if layer == 0 { config.emb_sz } else { config.n_hid };
            let out_dim = if layer + 1 == config.n_layers {
                config.emb_sz
            } else {
                config.n_hid
            };
            let rnn = candle_nn::lstm(
                in_dim,
                out_dim,
                LSTMConfig::default(),
                vb.pp(format!("rnns.{layer}")),
            )?;
            rnns.push(rnn);
        }

        Ok(Self {
            embedding,
            rnns,
            input_dp: RnnDropout::new(config.input_p),
            hidden_dp: RnnDropout::new(config.hidden_p),
            embed_p: config.embed_p,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &AwdLstmConfig {
        &self.config
    }

    /// The embedding matrix, `[vocab_size, emb_sz]`.
    pub fn embedding_weight(&self) -> &Tensor {
        self.embedding.embeddings()
    }

    /// Zero hidden state for a batch of `bs` sequences.
    pub fn zero_state(&self, bs: usize) -> Result<Vec<LSTMState>> {
        self.rnns.iter().map(|rnn| rnn.zero_state(bs)).collect()
    }

    /// Run `ids` (`[batch, seq_len]`) through the encoder.
    ///
    /// `state` continues from a previous call; it must come from a batch of
    /// the same size. Gradients do not flow into the previous batch.
    pub fn forward(
        &self,
        ids: &Tensor,
        state: Option<&[LSTMState]>,
        train: bool,
    ) -> Result<EncoderOutput> {
        let (bs, seq_len) = ids.dims2()?;
        let weight = embedding_dropout(self.embedding.embeddings(), self.embed_p, train)?;
        let embedded = weight
            .index_select(&ids.flatten_all()?, 0)?
            .reshape((bs, seq_len, self.config.emb_sz))?;
        let mut x = self.input_dp.forward(&embedded, train)?;

        let init = match state {
            Some(state) if state.len() == self.rnns.len() => state
                .iter()
                .map(|s| LSTMState {
                    h: s.h.detach(),
                    c: s.c.detach(),
                })
                .collect(),
            _ => self.zero_state(bs)?,
        };

        let last = self.rnns.len() - 1;
        let mut raw = Vec::with_capacity(self.rnns.len());
        let mut final_state = Vec::with_capacity(self.rnns.len());
        for (layer, (rnn, init)) in self.rnns.iter().zip(init.iter()).enumerate() {
            let states = rnn.seq_init(&x, init)?;
            let out = rnn.states_to_tensor(&states)?;
            if let Some(s) = states.last() {
                final_state.push(s.clone());
            }
            if layer != last {
                x = self.hidden_dp.forward(&out, train)?;
            }
            raw.push(out);
        }

        Ok(EncoderOutput {
            raw,
            state: final_state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn tiny() -> AwdLstmConfig {
        AwdLstmConfig {
            emb_sz: 6,
            n_hid: 10,
            n_layers: 2,
            ..Default::default()
        }
    }

    #[test]
    fn output_shapes() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let enc = AwdLstm::new(16, &tiny(), vb.pp("encoder")).unwrap();
        let ids = Tensor::new(&[[2u32, 5, 7], [2, 9, 1]], &Device::Cpu).unwrap();
        let out = enc.forward(&ids, None, true).unwrap();
        assert_eq!(out.raw.len(), 2);
        assert_eq!(out.raw[0].dims(), &[2, 3, 10]);
        assert_eq!(out.last().dims(), &[2, 3, 6]);
        assert_eq!(out.state.len(), 2);
        assert_eq!(out.state[1].h.dims(), &[2, 6]);
    }

    #[test]
    fn parameter_names() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        AwdLstm::new(16, &tiny(), vb.pp("encoder")).unwrap();
        let data = varmap.data().lock().unwrap();
        assert!(data.contains_key("encoder.embedding.weight"));
        assert!(data.contains_key("encoder.rnns.0.weight_ih_l0"));
        assert!(data.contains_key("encoder.rnns.1.weight_hh_l0"));
    }

    #[test]
    fn state_carries_over() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let enc = AwdLstm::new(16, &tiny(), vb.pp("encoder")).unwrap();
        let ids = Tensor::new(&[[3u32, 4]], &Device::Cpu).unwrap();
        let first = enc.forward(&ids, None, false).unwrap();
        let fresh = enc.forward(&ids, None, false).unwrap();
        let carried = enc.forward(&ids, Some(&first.state), false).unwrap();
        let a: Vec<f32> = fresh.last().flatten_all().unwrap().to_vec1().unwrap();
        let b: Vec<f32> = carried.last().flatten_all().unwrap().to_vec1().unwrap();
        assert_ne!(a, b);
    }
}
