pub mod awd_lstm;
pub mod classifier;
pub mod dropout;
pub mod lm;

pub use awd_lstm::{AwdLstm, EncoderOutput};
pub use classifier::{PoolingLinearClassifier, TextClassifier};
pub use dropout::RnnDropout;
pub use lm::{LanguageModel, LmOutput};
