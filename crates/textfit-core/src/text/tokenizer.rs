//! # Word tokenizer
//!
//! Splits raw text into lowercase word tokens and inserts marker tokens so
//! that information lost by lowercasing (capitalisation, repetition) stays
//! visible to the language model.

use std::sync::LazyLock;

use regex::Regex;

/// Unknown token.
pub const UNK: &str = "xxunk";
/// Padding token.
pub const PAD: &str = "xxpad";
/// Beginning of a text.
pub const BOS: &str = "xxbos";
/// End of a text.
pub const EOS: &str = "xxeos";
/// Field separator.
pub const FLD: &str = "xxfld";
/// Next word was capitalised.
pub const TK_MAJ: &str = "xxmaj";
/// Next word was all caps.
pub const TK_UP: &str = "xxup";
/// Character repetition.
pub const TK_REP: &str = "xxrep";
/// Word repetition.
pub const TK_WREP: &str = "xxwrep";

/// Special tokens, in the order they occupy the start of every vocabulary.
pub const SPECIAL_TOKENS: &[&str] = &[UNK, PAD, BOS, EOS, FLD, TK_MAJ, TK_UP, TK_REP, TK_WREP];

static RE_BR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<\s*br\s*/?\s*>").unwrap());
static RE_SPEC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([/#\\])").unwrap());
static RE_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").unwrap());
static RE_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}_]+|'[\p{L}]+|\n|[^\s\p{L}\p{N}_]").unwrap());

/// Rule-based word tokenizer.
#[derive(Debug, Clone, Default)]
pub struct Tokenizer;

impl Tokenizer {
    /// Create a new tokenizer instance.
    pub fn new() -> Self {
        Self
    }

    /// Tokenize one text. The result always starts with `xxbos`.
    ///
    /// # Examples
    /// ```
    /// use textfit_core::text::Tokenizer;
    ///
    /// let tokens = Tokenizer::new().tokenize("This is GREAT");
    /// assert_eq!(tokens, ["xxbos", "xxmaj", "this", "is", "xxup", "great"]);
    /// ```
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let text = fix_html(text);
        let text = RE_SPEC.replace_all(&text, " $1 ");
        let text = replace_char_repetitions(&text);
        let text = RE_SPACES.replace_all(&text, " ");

        let words: Vec<&str> = RE_WORD.find_iter(&text).map(|m| m.as_str()).collect();
        let words = replace_word_repetitions(&words);

        let mut tokens = Vec::with_capacity(words.len() + 1);
        tokens.push(BOS.to_string());
        for word in words {
            if SPECIAL_TOKENS.contains(&word.as_str()) {
                tokens.push(word);
                continue;
            }
            let letters = word.chars().filter(|c| c.is_alphabetic()).count();
            if letters > 1 && word.chars().all(|c| !c.is_alphabetic() || c.is_uppercase()) {
                tokens.push(TK_UP.to_string());
            } else if word.chars().next().is_some_and(char::is_uppercase) {
                tokens.push(TK_MAJ.to_string());
            }
            tokens.push(word.to_lowercase());
        }
        tokens
    }

    /// Tokenize many texts, preserving order.
    pub fn tokenize_batch<S: AsRef<str>>(&self, texts: &[S]) -> Vec<Vec<String>> {
        texts
            .iter()
            .map(|text| self.tokenize(text.as_ref()))
            .collect()
    }
}

fn fix_html(text: &str) -> String {
    let text = RE_BR.replace_all(text, "\n");
    text.replace("#39;", "'")
        .replace("amp;", "&")
        .replace("#146;", "'")
        .replace("nbsp;", " ")
        .replace("#36;", "$")
        .replace("\\n", "\n")
        .replace("quot;", "'")
        .replace("\\\"", "\"")
        .replace(" @.@ ", ".")
        .replace(" @-@ ", "-")
        .replace(" @,@ ", ",")
}

/// Collapse runs of 4+ identical non-space characters into `xxrep n c`.
fn replace_char_repetitions(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }
        if run >= 4 && !c.is_whitespace() {
            out.push_str(&format!(" {TK_REP} {run} {c} "));
        } else {
            out.extend(std::iter::repeat_n(c, run));
        }
        i += run;
    }
    out
}

/// Collapse runs of 4+ identical words into `xxwrep n word`.
fn replace_word_repetitions(words: &[&str]) -> Vec<String> {
    let mut out = Vec::with_capacity(words.len());
    let mut i = 0;
    while i < words.len() {
        let word = words[i];
        let mut run = 1;
        while i + run < words.len() && words[i + run] == word {
            run += 1;
        }
        if run >= 4 && word.chars().any(char::is_alphanumeric) {
            out.push(TK_WREP.to_string());
            out.push(run.to_string());
            out.push(word.to_string());
        } else {
            out.extend(std::iter::repeat_n(word.to_string(), run));
        }
        i += run;
    }
    out
}
