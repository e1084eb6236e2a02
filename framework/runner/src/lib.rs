mod cli;
mod collector;
mod init;
mod interrupt;
mod invoker;
mod progress;
mod registry;
mod run;

pub mod prelude {
    pub use crate::cli::GauntletCli;
    pub use crate::collector::{Collector, CollectorError};
    pub use crate::init::init;
    pub use crate::invoker::Invoker;
    pub use crate::registry::{Registry, RegistryError, ScenarioSpec};
    pub use crate::run::{run, RunError, RunOutcome};
}
