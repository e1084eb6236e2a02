use gauntlet_verdict_model::Verdict;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct ResultRow {
    scenario: String,
    status: String,
    duration_ms: u64,
    detail: String,
}

/// One line of the registry listing printed by `--check`.
///
/// Built by the caller from its scenario specs so that this crate stays independent of how
/// the registry is loaded.
#[derive(Tabled)]
pub struct RegistryRow {
    pub scenario: String,
    pub command: String,
    pub timeout_s: u64,
    pub expected: bool,
}

/// Prints the registered scenarios without running anything.
pub fn print_registry(rows: Vec<RegistryRow>) {
    println!("Registered scenarios");
    let mut table = Table::new(&rows);
    table.with(Style::modern());
    println!("{}", table);
}

/// Prints the per-scenario outcomes and the overall verdict to the console.
pub fn print_summary(verdict: &Verdict) {
    println!("\nScenario outcomes");
    let rows = verdict
        .results
        .iter()
        .map(|result| ResultRow {
            scenario: result.id.clone(),
            status: result.status.to_string(),
            duration_ms: result.duration_ms,
            detail: result.detail.clone().unwrap_or_else(|| "-".to_string()),
        })
        .collect::<Vec<_>>();

    let mut table = Table::new(&rows);
    table.with(Style::modern());

    println!("{}", table);
    println!(
        "{} passed, {} failed, {} errored, {} timed out, {} missing",
        verdict.counts.pass,
        verdict.counts.fail,
        verdict.counts.error,
        verdict.counts.timeout,
        verdict.counts.missing
    );
    println!("OVERALL: {}", verdict.overall);
}
