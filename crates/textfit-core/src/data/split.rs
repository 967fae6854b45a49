//! Train / validation / test partitioning.

use std::collections::BTreeSet;

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::data::dataset::{Row, SPLIT_COLUMN, SplitTag, TextDataset};
use crate::error::{Result, TextfitError};

/// A dataset partitioned into its three subsets.
#[derive(Debug, Clone, Default)]
pub struct Splits {
    pub train: Vec<Row>,
    pub valid: Vec<Row>,
    pub test: Vec<Row>,
}

impl Splits {
    /// Partition on the `set` column.
    pub fn by_column(dataset: TextDataset) -> Result<Self> {
        if !dataset.has_split_column {
            return Err(TextfitError::MissingColumn {
                name: SPLIT_COLUMN.to_string(),
            });
        }
        let mut splits = Self::default();
        for (index, row) in dataset.rows.into_iter().enumerate() {
            match row.split {
                Some(SplitTag::Train) => splits.train.push(row),
                Some(SplitTag::Valid) => splits.valid.push(row),
                Some(SplitTag::Test) => splits.test.push(row),
                None => {
                    return Err(TextfitError::InvalidSplitTag {
                        row: index,
                        value: String::new(),
                    });
                }
            }
        }
        splits.check()
    }

    /// Shuffle deterministically and hold out `valid_pct` of the rows.
    pub fn random(dataset: TextDataset, valid_pct: f64, seed: u64) -> Result<Self> {
        let mut rows = dataset.rows;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rows.shuffle(&mut rng);

        let n_valid = ((rows.len() as f64) * valid_pct).round() as usize;
        let n_valid = n_valid.min(rows.len());
        let train = rows.split_off(n_valid);

        Self {
            train,
            valid: rows,
            test: Vec::new(),
        }
        .check()
    }

    fn check(self) -> Result<Self> {
        if self.train.is_empty() {
            return Err(TextfitError::EmptyDataset {
                split: SplitTag::Train.to_string(),
            });
        }
        if self.valid.is_empty() {
            tracing::warn!("validation split is empty; validation metrics will be skipped");
        }
        tracing::info!(
            train = self.train.len(),
            valid = self.valid.len(),
            test = self.test.len(),
            "dataset split"
        );
        Ok(self)
    }

    /// Sorted class labels seen in the train and validation splits.
    pub fn classes(&self) -> Vec<String> {
        self.train
            .iter()
            .chain(self.valid.iter())
            .map(|r| r.label.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn rows(&self, tag: SplitTag) -> &[Row] {
        match tag {
            SplitTag::Train => &self.train,
            SplitTag::Valid => &self.valid,
            SplitTag::Test => &self.test,
        }
    }
}
