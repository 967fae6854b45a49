//! # Data bunches
//!
//! Numericalized splits ready for training. The language model bunch
//! streams contiguous windows over the concatenated corpus; the classifier
//! bunch yields padded batches of whole documents.

use candle_core::{Device, Tensor};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::data::dataset::{Row, SplitTag};
use crate::data::split::Splits;
use crate::error::{Result, TextfitError};
use crate::text::{Tokenizer, Vocab};

/// One language model batch: `x` and `y` are `[bs, seq_len]` token ids,
/// `y` shifted one position ahead of `x`.
#[derive(Debug, Clone)]
pub struct LmBatch {
    pub x: Tensor,
    pub y: Tensor,
}

/// Language model data: one id sequence per document, per split.
#[derive(Debug, Clone)]
pub struct LmDataBunch {
    pub vocab: Vocab,
    pub train: Vec<Vec<u32>>,
    pub valid: Vec<Vec<u32>>,
    pub test: Vec<Vec<u32>>,
    pub bs: usize,
    pub bptt: usize,
}

impl LmDataBunch {
    /// Tokenize every split and build the vocabulary from the training split.
    pub fn from_splits(
        splits: &Splits,
        tokenizer: &Tokenizer,
        max_vocab: usize,
        min_freq: usize,
        bs: usize,
        bptt: usize,
    ) -> Self {
        let tokenize = |rows: &[Row]| {
            let texts: Vec<&str> = rows.iter().map(|r| r.text.as_str()).collect();
            tokenizer.tokenize_batch(&texts)
        };
        let train_tokens = tokenize(&splits.train);
        let vocab = Vocab::create(&train_tokens, max_vocab, min_freq);
        tracing::info!(vocab_size = vocab.len(), "built vocabulary");

        let numericalize = |tokens: Vec<Vec<String>>| -> Vec<Vec<u32>> {
            tokens.iter().map(|t| vocab.numericalize(t)).collect()
        };
        let train = numericalize(train_tokens);
        let valid = numericalize(tokenize(&splits.valid));
        let test = numericalize(tokenize(&splits.test));

        Self {
            vocab,
            train,
            valid,
            test,
            bs,
            bptt,
        }
    }

    pub fn docs(&self, split: SplitTag) -> &[Vec<u32>] {
        match split {
            SplitTag::Train => &self.train,
            SplitTag::Valid => &self.valid,
            SplitTag::Test => &self.test,
        }
    }

    /// Cut a split into `bptt`-long windows over `bs` parallel rows.
    ///
    /// With a seed, documents are shuffled before concatenation. Consecutive
    /// batches continue each row, so the hidden state can carry over.
    pub fn batches(
        &self,
        split: SplitTag,
        seed: Option<u64>,
        device: &Device,
    ) -> Result<Vec<LmBatch>> {
        let mut docs: Vec<&Vec<u32>> = self.docs(split).iter().collect();
        if let Some(seed) = seed {
            docs.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
        }
        let stream: Vec<u32> = docs.into_iter().flatten().copied().collect();
        stream_batches(&stream, self.bs, self.bptt, device)
    }
}

fn stream_batches(stream: &[u32], bs: usize, bptt: usize, device: &Device) -> Result<Vec<LmBatch>> {
    if stream.len() < 2 {
        return Ok(Vec::new());
    }
    let usable = stream.len() - 1;
    let bs = bs.min(usable).max(1);
    let row_len = usable / bs;

    let mut batches = Vec::with_capacity(row_len.div_ceil(bptt));
    let mut start = 0;
    while start < row_len {
        let len = bptt.min(row_len - start);
        let mut x = Vec::with_capacity(bs * len);
        let mut y = Vec::with_capacity(bs * len);
        for b in 0..bs {
            let offset = b * row_len + start;
            x.extend_from_slice(&stream[offset..offset + len]);
            y.extend_from_slice(&stream[offset + 1..offset + len + 1]);
        }
        batches.push(LmBatch {
            x: Tensor::from_vec(x, (bs, len), device)?,
            y: Tensor::from_vec(y, (bs, len), device)?,
        });
        start += len;
    }
    Ok(batches)
}

/// One classified document.
#[derive(Debug, Clone)]
pub struct ClasItem {
    pub text: String,
    pub ids: Vec<u32>,
    pub label: u32,
}

/// One classifier batch: `x` is `[bs, seq_len]` left-padded ids, `y` is
/// `[bs]` class indices, `indices` points back into the split.
#[derive(Debug, Clone)]
pub struct ClasBatch {
    pub x: Tensor,
    pub y: Tensor,
    pub indices: Vec<usize>,
}

/// Classifier data sharing the language model's vocabulary.
#[derive(Debug, Clone)]
pub struct ClasDataBunch {
    pub vocab: Vocab,
    pub classes: Vec<String>,
    pub train: Vec<ClasItem>,
    pub valid: Vec<ClasItem>,
    pub test: Vec<ClasItem>,
    pub bs: usize,
    pub max_len: usize,
}

impl ClasDataBunch {
    /// Tokenize every split with the given (language model) vocabulary.
    pub fn from_splits(
        splits: &Splits,
        tokenizer: &Tokenizer,
        vocab: Vocab,
        bs: usize,
        max_len: usize,
    ) -> Result<Self> {
        let classes = splits.classes();
        let items = |rows: &[Row], split: SplitTag| {
            let texts: Vec<&str> = rows.iter().map(|r| r.text.as_str()).collect();
            let tokens = tokenizer.tokenize_batch(&texts);
            let mut items = Vec::with_capacity(rows.len());
            let mut dropped = 0usize;
            for (row, toks) in rows.iter().zip(tokens) {
                let Some(label) = classes.iter().position(|c| *c == row.label) else {
                    dropped += 1;
                    continue;
                };
                let mut ids = vocab.numericalize(&toks);
                ids.truncate(max_len.max(1));
                items.push(ClasItem {
                    text: row.text.clone(),
                    ids,
                    label: label as u32,
                });
            }
            if dropped > 0 {
                tracing::warn!(%split, dropped, "dropped rows with labels unseen in training");
            }
            items
        };

        let train = items(&splits.train, SplitTag::Train);
        let valid = items(&splits.valid, SplitTag::Valid);
        let test = items(&splits.test, SplitTag::Test);
        if train.is_empty() {
            return Err(TextfitError::EmptyDataset {
                split: SplitTag::Train.to_string(),
            });
        }
        tracing::info!(classes = classes.len(), "built classifier data");

        Ok(Self {
            vocab,
            classes,
            train,
            valid,
            test,
            bs,
            max_len,
        })
    }

    pub fn items(&self, split: SplitTag) -> &[ClasItem] {
        match split {
            SplitTag::Train => &self.train,
            SplitTag::Valid => &self.valid,
            SplitTag::Test => &self.test,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Split used for final reporting: test if any of its rows survived
    /// label filtering, otherwise validation.
    pub fn held_out(&self) -> SplitTag {
        if self.test.is_empty() {
            SplitTag::Valid
        } else {
            SplitTag::Test
        }
    }

    /// Padded batches over a split; shuffled when a seed is given.
    pub fn batches(
        &self,
        split: SplitTag,
        seed: Option<u64>,
        device: &Device,
    ) -> Result<Vec<ClasBatch>> {
        let items = self.items(split);
        let mut order: Vec<usize> = (0..items.len()).collect();
        if let Some(seed) = seed {
            order.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
        }
        let pad = self.vocab.pad_id();

        order
            .chunks(self.bs.max(1))
            .map(|chunk| {
                let seqs: Vec<&[u32]> = chunk.iter().map(|&i| items[i].ids.as_slice()).collect();
                let labels: Vec<u32> = chunk.iter().map(|&i| items[i].label).collect();
                Ok(ClasBatch {
                    x: pad_batch(&seqs, pad, device)?,
                    y: Tensor::new(labels.as_slice(), device)?,
                    indices: chunk.to_vec(),
                })
            })
            .collect()
    }
}

/// Left-pad sequences to a common length and stack them into `[n, len]`.
pub fn pad_batch(seqs: &[&[u32]], pad: u32, device: &Device) -> Result<Tensor> {
    let len = seqs.iter().map(|s| s.len()).max().unwrap_or(0).max(1);
    let mut flat = Vec::with_capacity(seqs.len() * len);
    for seq in seqs {
        flat.extend(std::iter::repeat_n(pad, len - seq.len()));
        flat.extend_from_slice(seq);
    }
    Ok(Tensor::from_vec(flat, (seqs.len(), len), device)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(text: &str, label: &str) -> Row {
        Row {
            text: text.into(),
            label: label.into(),
            split: None,
        }
    }

    fn splits() -> Splits {
        Splits {
            train: vec![
                row("the movie was good", "pos"),
                row("the movie was bad", "neg"),
                row("good good movie", "pos"),
            ],
            valid: vec![row("bad movie", "neg")],
            test: vec![row("strange movie", "other"), row("good", "pos")],
        }
    }

    #[test]
    fn stream_windows_shift_by_one() {
        let stream: Vec<u32> = (0..21).collect();
        let batches = stream_batches(&stream, 2, 4, &Device::Cpu).unwrap();
        // 20 usable tokens over 2 rows of 10 -> windows of 4, 4, 2
        assert_eq!(batches.len(), 3);
        let x: Vec<Vec<u32>> = batches[0].x.to_vec2().unwrap();
        let y: Vec<Vec<u32>> = batches[0].y.to_vec2().unwrap();
        assert_eq!(x, vec![vec![0, 1, 2, 3], vec![10, 11, 12, 13]]);
        assert_eq!(y, vec![vec![1, 2, 3, 4], vec![11, 12, 13, 14]]);
        assert_eq!(batches[2].x.dims(), &[2, 2]);
    }

    #[test]
    fn stream_too_short() {
        assert!(stream_batches(&[3], 4, 4, &Device::Cpu).unwrap().is_empty());
        let batches = stream_batches(&[1, 2, 3], 8, 4, &Device::Cpu).unwrap();
        assert_eq!(batches[0].x.dims(), &[2, 1]);
    }

    #[test]
    fn lm_bunch_builds_vocab_from_train() {
        let lm = LmDataBunch::from_splits(&splits(), &Tokenizer::new(), 100, 1, 2, 3);
        assert!(lm.vocab.id("movie").is_some());
        assert!(lm.vocab.id("strange").is_none());
        assert_eq!(lm.train.len(), 3);
        assert!(!lm.batches(SplitTag::Train, Some(1), &Device::Cpu).unwrap().is_empty());
    }

    #[test]
    fn clas_bunch_shares_vocab_and_drops_unseen_labels() {
        let tok = Tokenizer::new();
        let lm = LmDataBunch::from_splits(&splits(), &tok, 100, 1, 2, 3);
        let clas = ClasDataBunch::from_splits(&splits(), &tok, lm.vocab.clone(), 2, 100).unwrap();
        assert_eq!(clas.vocab, lm.vocab);
        assert_eq!(clas.classes, vec!["neg", "pos"]);
        assert_eq!(clas.test.len(), 1);
        assert_eq!(clas.train[0].label, 1);
    }

    #[test]
    fn held_out_skips_test_with_only_unseen_labels() {
        let tok = Tokenizer::new();
        let lm = LmDataBunch::from_splits(&splits(), &tok, 100, 1, 2, 3);
        let clas = ClasDataBunch::from_splits(&splits(), &tok, lm.vocab.clone(), 2, 100).unwrap();
        assert_eq!(clas.held_out(), SplitTag::Test);

        let mut only_unseen = splits();
        only_unseen.test.retain(|r| r.label == "other");
        let clas = ClasDataBunch::from_splits(&only_unseen, &tok, lm.vocab, 2, 100).unwrap();
        assert!(clas.test.is_empty());
        assert_eq!(clas.held_out(), SplitTag::Valid);
    }

    #[test]
    fn clas_batches_are_left_padded() {
        let tok = Tokenizer::new();
        let lm = LmDataBunch::from_splits(&splits(), &tok, 100, 1, 2, 3);
        let clas = ClasDataBunch::from_splits(&splits(), &tok, lm.vocab.clone(), 2, 100).unwrap();
        let batches = clas.batches(SplitTag::Train, None, &Device::Cpu).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].indices, vec![0, 1]);
        let pad = clas.vocab.pad_id();
        let x: Vec<Vec<u32>> = batches[0].x.to_vec2().unwrap();
        assert_eq!(x[0].len(), x[1].len());
        let y: Vec<u32> = batches[1].y.to_vec1().unwrap();
        assert_eq!(y, vec![1]);
        let single: Vec<Vec<u32>> = batches[1].x.to_vec2().unwrap();
        assert_ne!(single[0][0], pad);
    }

    #[test]
    fn pad_batch_pads_first() {
        let t = pad_batch(&[&[5, 6, 7], &[8]], 1, &Device::Cpu).unwrap();
        let v: Vec<Vec<u32>> = t.to_vec2().unwrap();
        assert_eq!(v, vec![vec![5, 6, 7], vec![1, 1, 8]]);
    }
}
