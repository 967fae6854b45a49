//! # Textfit
//!
//! Text classification by transfer learning: fine-tune an AWD-LSTM language
//! model on a corpus, reuse its encoder in a classifier, and fine-tune that.
//!
//! The training pipeline lives in [`trainer`]; everything else is
//! re-exported from `textfit-core`.
//!
//! ```no_run
//! use textfit::TextPredictor;
//!
//! let predictor = TextPredictor::load("models/textclassifier.safetensors")?;
//! let prediction = predictor.predict("What a wonderful film")?;
//! println!("{} ({:.2})", prediction.label, prediction.probs[prediction.index]);
//! # Ok::<(), textfit::TextfitError>(())
//! ```

pub use textfit_core::*;
pub use textfit_trainer as trainer;
