mod artifact;
mod console;
mod text;

pub mod prelude {
    pub use crate::artifact::{write_verdict_json, RunArtifact};
    pub use crate::console::{print_registry, print_summary, RegistryRow};
    pub use crate::text::{render_report, write_report};
}
