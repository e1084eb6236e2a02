use crate::cli::GauntletCli;
use clap::Parser;

/// Initialise the CLI and logging for the gauntlet aggregator.
pub fn init() -> GauntletCli {
    env_logger::init();

    GauntletCli::parse()
}
