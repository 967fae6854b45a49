use clap::Parser;
use textfit_trainer::cli::{RANDOM_SPLIT_FLAGS, RandomSplitArgs, normalize_legacy_flags};
use textfit_trainer::{init_logging, run_random_split};

fn main() {
    init_logging();
    let args = RandomSplitArgs::parse_from(normalize_legacy_flags(
        std::env::args(),
        RANDOM_SPLIT_FLAGS,
    ));
    if let Err(e) = run_random_split(&args) {
        eprintln!("Training failed: {e:#}");
        std::process::exit(1);
    }
}
