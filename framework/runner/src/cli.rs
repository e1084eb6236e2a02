use clap::Parser;
use std::num::NonZeroUsize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(about, long_about = None)]
pub struct GauntletCli {
    /// Path to the scenario registry file
    #[clap(short, long)]
    pub registry: PathBuf,

    /// Directory where scenario logs, the report, and run artifacts are written
    #[clap(long, default_value = "gauntlet-out")]
    pub out_dir: PathBuf,

    /// The maximum number of scenarios to run concurrently.
    ///
    /// Defaults to running every scenario at once.
    #[clap(short, long)]
    pub jobs: Option<NonZeroUsize>,

    /// Use this run id instead of generating one
    #[clap(long)]
    pub run_id: Option<String>,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// Validate the registry and exit without running any scenarios
    #[clap(long, default_value = "false")]
    pub check: bool,
}
