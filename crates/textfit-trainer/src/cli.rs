//! Command-line arguments for the two trainers.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser};
use textfit_core::TrainConfig;

/// Single-dash abbreviations accepted by `train`.
pub const COLUMN_SPLIT_FLAGS: &[(&str, &str)] = &[
    ("-dp", "--datasetpath"),
    ("-tcol", "--textcolumn"),
    ("-lcol", "--labelcolumn"),
    ("-lme", "--languagemodelepochs"),
    ("-tce", "--textclassifierepochs"),
];

/// Single-dash abbreviations accepted by `train-random-split`.
pub const RANDOM_SPLIT_FLAGS: &[(&str, &str)] = &[
    ("-dp", "--datasetpath"),
    ("-lme", "--learningmodelepochs"),
    ("-tce", "--textclassifierepochs"),
];

/// Rewrite multi-letter single-dash flags (`-dp path`, `-dp=path`) to their
/// long forms, which clap can parse. Other arguments pass through.
pub fn normalize_legacy_flags<I>(args: I, table: &[(&str, &str)]) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    args.into_iter()
        .map(|arg| {
            let (flag, value) = match arg.split_once('=') {
                Some((flag, value)) => (flag, Some(value)),
                None => (arg.as_str(), None),
            };
            match table.iter().find(|(short, _)| *short == flag) {
                Some((_, long)) => match value {
                    Some(value) => format!("{long}={value}"),
                    None => long.to_string(),
                },
                None => arg,
            }
        })
        .collect()
}

/// Options shared by both trainers.
#[derive(Debug, Clone, Default, Args)]
pub struct CommonArgs {
    /// JSON training configuration; flags override its values
    #[arg(long, env = "TEXTFIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for encoders, checkpoints, and exported models
    #[arg(long = "models-dir", env = "TEXTFIT_MODELS_DIR")]
    pub models_dir: Option<PathBuf>,

    /// Directory with pretrained language model weights and vocabulary
    #[arg(long)]
    pub pretrained: Option<PathBuf>,
}

impl CommonArgs {
    /// Base configuration from `--config` (or defaults) with directory
    /// overrides applied.
    pub fn base_config(&self) -> anyhow::Result<TrainConfig> {
        let mut config = match &self.config {
            Some(path) => TrainConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => TrainConfig::default(),
        };
        if let Some(dir) = &self.models_dir {
            config.models_dir = dir.clone();
        }
        if let Some(dir) = &self.pretrained {
            config.pretrained_dir = Some(dir.clone());
        }
        Ok(config)
    }
}

/// Train on a CSV whose `set` column assigns rows to train, val, and test.
#[derive(Debug, Clone, Parser)]
#[command(name = "train", version)]
pub struct ColumnSplitArgs {
    /// str: path to csv dataset
    #[arg(long = "datasetpath")]
    pub dataset_path: PathBuf,

    /// int: column index of text
    #[arg(long = "textcolumn")]
    pub text_column: usize,

    /// int: column index of labels
    #[arg(long = "labelcolumn")]
    pub label_column: usize,

    /// int: number of epochs to train the language model learner
    #[arg(long = "languagemodelepochs", default_value_t = 1)]
    pub lm_epochs: usize,

    /// int: number of epochs to train the text classifier
    #[arg(long = "textclassifierepochs", default_value_t = 1)]
    pub clas_epochs: usize,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl ColumnSplitArgs {
    pub fn config(&self) -> anyhow::Result<TrainConfig> {
        let mut config = self.common.base_config()?;
        config.lm_epochs = self.lm_epochs;
        config.clas_epochs = self.clas_epochs;
        config.validate()?;
        Ok(config)
    }
}

/// Train on a CSV with labels in column 0 and text in column 1, split at random.
#[derive(Debug, Clone, Parser)]
#[command(name = "train-random-split", version)]
pub struct RandomSplitArgs {
    /// str: path to csv dataset
    #[arg(long = "datasetpath")]
    pub dataset_path: PathBuf,

    /// int: number of epochs to train the language model learner
    #[arg(long = "learningmodelepochs", default_value_t = 2)]
    pub lm_epochs: usize,

    /// int: number of epochs to train the text classifier
    #[arg(long = "textclassifierepochs", default_value_t = 2)]
    pub clas_epochs: usize,

    /// Fraction of rows held out for validation
    #[arg(long = "valid-pct")]
    pub valid_pct: Option<f64>,

    /// Seed for the split and batch shuffling
    #[arg(long)]
    pub seed: Option<u64>,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl RandomSplitArgs {
    pub fn config(&self) -> anyhow::Result<TrainConfig> {
        let mut config = self.common.base_config()?;
        config.lm_epochs = self.lm_epochs;
        config.clas_epochs = self.clas_epochs;
        if let Some(pct) = self.valid_pct {
            config.valid_pct = pct;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rewrites_single_dash_flags() {
        let out = normalize_legacy_flags(
            args(&["train", "-dp", "data.csv", "-tcol=1", "-lcol", "0", "--models-dir", "m"]),
            COLUMN_SPLIT_FLAGS,
        );
        assert_eq!(
            out,
            args(&[
                "train",
                "--datasetpath",
                "data.csv",
                "--textcolumn=1",
                "--labelcolumn",
                "0",
                "--models-dir",
                "m"
            ])
        );
    }

    #[test]
    fn column_split_parses_legacy_command_line() {
        let argv = normalize_legacy_flags(
            args(&["train", "-dp", "d.csv", "-tcol", "2", "-lcol", "1", "-lme", "3"]),
            COLUMN_SPLIT_FLAGS,
        );
        let parsed = ColumnSplitArgs::try_parse_from(argv).unwrap();
        assert_eq!(parsed.dataset_path, PathBuf::from("d.csv"));
        assert_eq!(parsed.text_column, 2);
        assert_eq!(parsed.label_column, 1);
        assert_eq!(parsed.lm_epochs, 3);
        assert_eq!(parsed.clas_epochs, 1);
    }

    #[test]
    fn column_split_requires_columns() {
        let argv = normalize_legacy_flags(args(&["train", "-dp", "d.csv"]), COLUMN_SPLIT_FLAGS);
        assert!(ColumnSplitArgs::try_parse_from(argv).is_err());
    }

    #[test]
    fn random_split_defaults() {
        let argv = normalize_legacy_flags(
            args(&["train-random-split", "-dp", "d.csv"]),
            RANDOM_SPLIT_FLAGS,
        );
        let parsed = RandomSplitArgs::try_parse_from(argv).unwrap();
        assert_eq!(parsed.lm_epochs, 2);
        assert_eq!(parsed.clas_epochs, 2);

        let config = parsed.config().unwrap();
        assert_eq!(config.lm_epochs, 2);
        assert_eq!(config.valid_pct, 0.2);
    }

    #[test]
    fn random_split_uses_its_own_lm_flag() {
        let argv = normalize_legacy_flags(
            args(&["train-random-split", "-dp", "d.csv", "-lme", "5", "--seed", "7"]),
            RANDOM_SPLIT_FLAGS,
        );
        let parsed = RandomSplitArgs::try_parse_from(argv).unwrap();
        assert_eq!(parsed.lm_epochs, 5);
        assert_eq!(parsed.config().unwrap().seed, 7);
    }

    #[test]
    fn invalid_override_fails_validation() {
        let parsed = RandomSplitArgs {
            dataset_path: "d.csv".into(),
            lm_epochs: 1,
            clas_epochs: 1,
            valid_pct: Some(1.5),
            seed: None,
            common: CommonArgs::default(),
        };
        assert!(parsed.config().is_err());
    }
}
