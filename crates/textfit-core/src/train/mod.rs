pub mod clas_learner;
pub mod learner;
pub mod lm_learner;
pub mod one_cycle;

pub use clas_learner::{Preds, TextClassifierLearner};
pub use learner::{EpochMetrics, Learner};
pub use lm_learner::LanguageModelLearner;
pub use one_cycle::OneCycleSchedule;
