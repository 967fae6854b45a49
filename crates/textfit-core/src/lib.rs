//! # Textfit Core
//!
//! Two-stage transfer learning for text classification. A recurrent
//! AWD-LSTM language model is fine-tuned on the corpus, its encoder is
//! reused by a classifier, and the classifier is fine-tuned and exported.
//!
//! ## Quick Start
//!
//! ```rust
//! use textfit_core::{Tokenizer, Vocab};
//!
//! let tokenizer = Tokenizer::new();
//! let tokens = tokenizer.tokenize("The Movie was GREAT!");
//! assert_eq!(tokens[0], "xxbos");
//!
//! let vocab = Vocab::create(&[tokens.clone()], 60_000, 1);
//! let ids = vocab.numericalize(&tokens);
//! assert_eq!(vocab.textify(&ids), tokens.join(" "));
//! ```
pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod interp;
pub mod model;
pub mod text;
pub mod train;

// Re-export primary API
pub use config::{AwdLstmConfig, TrainConfig};
pub use data::{ClasDataBunch, ColumnSpec, LmDataBunch, Row, SplitTag, Splits, TextDataset};
pub use error::{Result, TextfitError};
pub use export::{Prediction, TextPredictor};
pub use interp::ClassificationInterpretation;
pub use model::{AwdLstm, LanguageModel, TextClassifier};
pub use text::{Tokenizer, Vocab};
pub use train::{
    EpochMetrics, LanguageModelLearner, OneCycleSchedule, Preds, TextClassifierLearner,
};
