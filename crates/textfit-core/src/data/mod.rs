pub mod bunch;
pub mod dataset;
pub mod split;

pub use bunch::{ClasBatch, ClasDataBunch, ClasItem, LmBatch, LmDataBunch};
pub use dataset::{ColumnSpec, Row, SplitTag, TextDataset};
pub use split::Splits;
