use thiserror::Error;

/// Errors that can occur while preparing data, training, or exporting a model.
#[derive(Debug, Error)]
pub enum TextfitError {
    /// A split that must contain rows is empty.
    #[error("dataset split '{split}' is empty")]
    EmptyDataset {
        /// Name of the empty split.
        split: String,
    },

    /// A named column is absent from the CSV header.
    #[error("column {name:?} not found in dataset header")]
    MissingColumn {
        /// The column that was looked up.
        name: String,
    },

    /// A column index points past the end of a row.
    #[error("column index {index} is out of range for rows with {width} columns")]
    ColumnOutOfRange {
        /// Requested column index.
        index: usize,
        /// Number of columns in the offending row.
        width: usize,
    },

    /// The split column holds something other than `train`, `val` or `test`.
    #[error("row {row}: invalid split tag {value:?} (expected train, val or test)")]
    InvalidSplitTag {
        /// Zero-based data row number.
        row: usize,
        /// The value found.
        value: String,
    },

    /// The vocabulary of a saved encoder does not match the current one.
    #[error("vocabulary mismatch: expected {expected} tokens, found {found}")]
    VocabMismatch {
        /// Size of the vocabulary in use.
        expected: usize,
        /// Size of the vocabulary on disk.
        found: usize,
    },

    /// Encoder weights could not be applied to the model.
    #[error("encoder mismatch: {0}")]
    EncoderMismatch(String),

    /// An invalid training configuration was provided.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An exported model file is malformed.
    #[error("export error: {0}")]
    Export(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Candle tensor error.
    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),

    /// Safetensors (de)serialization error.
    #[error("safetensors error: {0}")]
    Safetensors(#[from] safetensors::SafeTensorError),
}

/// Result type alias for textfit operations.
pub type Result<T> = std::result::Result<T, TextfitError>;
