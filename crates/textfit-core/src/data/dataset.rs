//! CSV loading for labelled text datasets.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Result, TextfitError};

/// Name of the column that assigns each row to a split.
pub const SPLIT_COLUMN: &str = "set";

/// Which subset a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SplitTag {
    Train,
    Valid,
    Test,
}

impl FromStr for SplitTag {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "train" => Ok(Self::Train),
            "val" => Ok(Self::Valid),
            "test" => Ok(Self::Test),
            _ => Err(()),
        }
    }
}

impl fmt::Display for SplitTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Train => "train",
            Self::Valid => "val",
            Self::Test => "test",
        })
    }
}

/// Which CSV columns hold the text and the label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub text: usize,
    pub label: usize,
}

impl Default for ColumnSpec {
    /// Label in the first column, text in the second.
    fn default() -> Self {
        Self { text: 1, label: 0 }
    }
}

/// One labelled example.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub text: String,
    pub label: String,
    pub split: Option<SplitTag>,
}

/// All rows of a CSV file.
#[derive(Debug, Clone, Default)]
pub struct TextDataset {
    pub rows: Vec<Row>,
    /// Whether the file had a split column.
    pub has_split_column: bool,
}

impl TextDataset {
    /// Read a CSV file with a header row.
    pub fn from_csv<P: AsRef<Path>>(path: P, columns: ColumnSpec) -> Result<Self> {
        let path = path.as_ref();
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;
        let dataset = Self::from_reader(reader, columns)?;
        tracing::info!(
            path = %path.display(),
            rows = dataset.rows.len(),
            split_column = dataset.has_split_column,
            "loaded dataset"
        );
        Ok(dataset)
    }

    /// Parse CSV data from any reader.
    pub fn from_reader<R: std::io::Read>(
        mut reader: csv::Reader<R>,
        columns: ColumnSpec,
    ) -> Result<Self> {
        let headers = reader.headers()?.clone();
        let width = headers.len();
        for index in [columns.text, columns.label] {
            if index >= width {
                return Err(TextfitError::ColumnOutOfRange { index, width });
            }
        }
        let split_idx = headers.iter().position(|h| h.trim() == SPLIT_COLUMN);

        let mut rows = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let field = |index: usize| {
                record.get(index).ok_or(TextfitError::ColumnOutOfRange {
                    index,
                    width: record.len(),
                })
            };
            let text = field(columns.text)?.to_string();
            let label = field(columns.label)?.trim().to_string();
            let split = match split_idx {
                Some(idx) => {
                    let value = field(idx)?.trim();
                    let tag = value
                        .parse::<SplitTag>()
                        .map_err(|_| TextfitError::InvalidSplitTag {
                            row,
                            value: value.to_string(),
                        })?;
                    Some(tag)
                }
                None => None,
            };
            rows.push(Row { text, label, split });
        }

        Ok(Self {
            rows,
            has_split_column: split_idx.is_some(),
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(data: &str, columns: ColumnSpec) -> Result<TextDataset> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(data.as_bytes());
        TextDataset::from_reader(reader, columns)
    }

    #[test]
    fn reads_split_column() {
        let data = "label,text,set\npos,\"good, very good\",train\nneg,bad,val\npos,fine,test\n";
        let ds = parse(data, ColumnSpec::default()).unwrap();
        assert!(ds.has_split_column);
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.rows[0].text, "good, very good");
        assert_eq!(ds.rows[1].split, Some(SplitTag::Valid));
        assert_eq!(ds.rows[2].split, Some(SplitTag::Test));
    }

    #[test]
    fn explicit_columns() {
        let data = "id,text,label\n1,hello,a\n2,bye,b\n";
        let ds = parse(data, ColumnSpec { text: 1, label: 2 }).unwrap();
        assert!(!ds.has_split_column);
        assert_eq!(ds.rows[1].label, "b");
        assert_eq!(ds.rows[1].split, None);
    }

    #[test]
    fn column_out_of_range() {
        let data = "label,text\npos,good\n";
        let err = parse(data, ColumnSpec { text: 5, label: 0 }).unwrap_err();
        assert!(matches!(
            err,
            TextfitError::ColumnOutOfRange { index: 5, width: 2 }
        ));
    }

    #[test]
    fn invalid_split_tag() {
        let data = "label,text,set\npos,good,train\nneg,bad,dev\n";
        let err = parse(data, ColumnSpec::default()).unwrap_err();
        assert!(matches!(err, TextfitError::InvalidSplitTag { row: 1, .. }));
    }

    #[test]
    fn short_row_is_rejected() {
        let data = "label,text,set\npos\n";
        let err = parse(data, ColumnSpec::default()).unwrap_err();
        assert!(matches!(err, TextfitError::ColumnOutOfRange { .. }));
    }

    #[test]
    fn split_tag_display_roundtrip() {
        for tag in [SplitTag::Train, SplitTag::Valid, SplitTag::Test] {
            assert_eq!(tag.to_string().parse::<SplitTag>(), Ok(tag));
        }
    }
}
