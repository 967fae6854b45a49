use clap::Parser;
use textfit_trainer::cli::{COLUMN_SPLIT_FLAGS, ColumnSplitArgs, normalize_legacy_flags};
use textfit_trainer::{init_logging, run_column_split};

fn main() {
    init_logging();
    let args = ColumnSplitArgs::parse_from(normalize_legacy_flags(
        std::env::args(),
        COLUMN_SPLIT_FLAGS,
    ));
    if let Err(e) = run_column_split(&args) {
        eprintln!("Training failed: {e:#}");
        std::process::exit(1);
    }
}
