//! Token vocabulary shared by the language model and the classifier.

use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;
use crate::text::tokenizer::{PAD, SPECIAL_TOKENS, UNK};

/// Filler token used to round the vocabulary size up to a multiple of 8.
const FAKE: &str = "xxfake";

/// Mapping between tokens and integer ids.
#[derive(Debug, Clone, PartialEq)]
pub struct Vocab {
    itos: Vec<String>,
    stoi: HashMap<String, u32>,
}

impl Vocab {
    /// Build a vocabulary from tokenized texts.
    ///
    /// Tokens seen fewer than `min_freq` times are dropped, the most frequent
    /// `max_vocab` survive, and special tokens always come first.
    pub fn create(texts: &[Vec<String>], max_vocab: usize, min_freq: usize) -> Self {
        let mut freq: HashMap<&str, usize> = HashMap::new();
        for token in texts.iter().flatten() {
            *freq.entry(token.as_str()).or_default() += 1;
        }

        let mut candidates: Vec<(&str, usize)> = freq
            .into_iter()
            .filter(|(tok, n)| *n >= min_freq && !SPECIAL_TOKENS.contains(tok))
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let mut itos: Vec<String> = SPECIAL_TOKENS.iter().map(|s| s.to_string()).collect();
        let room = max_vocab.saturating_sub(itos.len());
        itos.extend(candidates.into_iter().take(room).map(|(t, _)| t.to_string()));

        let mut fake = 0;
        while itos.len() % 8 != 0 {
            itos.push(format!("{FAKE}{fake}"));
            fake += 1;
        }

        Self::from_itos(itos)
    }

    /// Build a vocabulary from an ordered token list.
    pub fn from_itos(itos: Vec<String>) -> Self {
        let mut stoi = HashMap::with_capacity(itos.len());
        for (i, tok) in itos.iter().enumerate() {
            stoi.entry(tok.clone()).or_insert(i as u32);
        }
        Self { itos, stoi }
    }

    pub fn len(&self) -> usize {
        self.itos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.itos.is_empty()
    }

    pub fn itos(&self) -> &[String] {
        &self.itos
    }

    /// Id of `token`, if it is in the vocabulary.
    pub fn id(&self, token: &str) -> Option<u32> {
        self.stoi.get(token).copied()
    }

    pub fn unk_id(&self) -> u32 {
        self.id(UNK).unwrap_or(0)
    }

    pub fn pad_id(&self) -> u32 {
        self.id(PAD).unwrap_or(1)
    }

    /// Map tokens to ids; unknown tokens become `xxunk`.
    pub fn numericalize<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<u32> {
        let unk = self.unk_id();
        tokens
            .iter()
            .map(|t| self.id(t.as_ref()).unwrap_or(unk))
            .collect()
    }

    /// Map ids back to a space-separated string.
    pub fn textify(&self, ids: &[u32]) -> String {
        ids.iter()
            .map(|&i| self.itos.get(i as usize).map_or(UNK, String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Write the token list as a JSON array.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, serde_json::to_string(&self.itos)?)?;
        Ok(())
    }

    /// Read a token list written by [`Vocab::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let itos: Vec<String> = serde_json::from_str(&content)?;
        Ok(Self::from_itos(itos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn specials_come_first() {
        let vocab = Vocab::create(&[toks("a b a b c")], 100, 2);
        assert_eq!(&vocab.itos()[..SPECIAL_TOKENS.len()], SPECIAL_TOKENS);
        assert_eq!(vocab.id("xxunk"), Some(0));
        assert_eq!(vocab.pad_id(), 1);
    }

    #[test]
    fn min_freq_filters_rare_tokens() {
        let vocab = Vocab::create(&[toks("a b a b c")], 100, 2);
        assert!(vocab.id("a").is_some());
        assert!(vocab.id("b").is_some());
        assert!(vocab.id("c").is_none());
        assert_eq!(vocab.numericalize(&["c"]), vec![vocab.unk_id()]);
    }

    #[test]
    fn frequency_order_and_ties() {
        let vocab = Vocab::create(&[toks("z z z y y x x")], 100, 1);
        let n = SPECIAL_TOKENS.len();
        assert_eq!(vocab.itos()[n], "z");
        assert_eq!(vocab.itos()[n + 1], "x");
        assert_eq!(vocab.itos()[n + 2], "y");
    }

    #[test]
    fn size_is_multiple_of_eight() {
        let vocab = Vocab::create(&[toks("a b c")], 100, 1);
        assert_eq!(vocab.len() % 8, 0);
        assert_eq!(vocab.len(), 16);
    }

    #[test]
    fn max_vocab_caps_size() {
        let text: Vec<String> = (0..50).map(|i| format!("w{i}")).collect();
        let vocab = Vocab::create(&[text], 16, 1);
        assert_eq!(vocab.len(), 16);
    }

    #[test]
    fn textify_inverts_numericalize() {
        let vocab = Vocab::create(&[toks("hello world hello world")], 100, 1);
        let ids = vocab.numericalize(&toks("hello world"));
        assert_eq!(vocab.textify(&ids), "hello world");
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.json");
        let vocab = Vocab::create(&[toks("a a b b")], 100, 1);
        vocab.save(&path).unwrap();
        assert_eq!(Vocab::load(&path).unwrap(), vocab);
    }
}
