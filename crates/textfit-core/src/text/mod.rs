pub mod tokenizer;
pub mod vocab;

pub use tokenizer::{SPECIAL_TOKENS, Tokenizer};
pub use vocab::Vocab;
