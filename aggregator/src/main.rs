use std::process::ExitCode;

use gauntlet_report::prelude::{
    print_registry, print_summary, write_report, write_verdict_json, RegistryRow, RunArtifact,
};
use gauntlet_runner::prelude::{init, run, GauntletCli, Registry, RunError, RunOutcome};
use gauntlet_verdict_model::{append_run_record, RunRecord};

/// Exit code when every expected scenario passed
const EXIT_PASS: u8 = 0;
/// Exit code when the verdict is FAIL
const EXIT_FAIL: u8 = 1;
/// Exit code for configuration problems, before or instead of a verdict
const EXIT_CONFIG: u8 = 2;
/// Exit code when the run was interrupted before completing
const EXIT_INTERRUPTED: u8 = 130;

/// File name of the append-only run history within the output directory
const HISTORY_FILE_NAME: &str = "history.jsonl";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = init();

    // A registry that fails validation aborts the run before any scenario can produce
    // evidence, and the CI platform sees a CONFIG exit rather than a verdict.
    let registry = match Registry::load(&cli.registry) {
        Ok(registry) => registry,
        Err(e) => {
            log::error!("Invalid scenario registry '{}': {e}", cli.registry.display());
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    if cli.check {
        print_registry(
            registry
                .scenarios()
                .iter()
                .map(|spec| RegistryRow {
                    scenario: spec.id.clone(),
                    command: spec.command.clone(),
                    timeout_s: spec.timeout.as_secs(),
                    expected: spec.expected,
                })
                .collect(),
        );
        return ExitCode::from(EXIT_PASS);
    }

    let outcome = match run(&cli, &registry).await {
        Ok(outcome) => outcome,
        Err(RunError::Interrupted) => {
            // An interrupted run emits no report at all, a partial report must never be
            // mistaken for evidence.
            log::error!("Run interrupted, no verdict computed");
            return ExitCode::from(EXIT_INTERRUPTED);
        }
        Err(e) => {
            log::error!("Run aborted: {e:?}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    if let Err(e) = emit_artifacts(&cli, &outcome) {
        log::error!("Failed to write run artifacts: {e:?}");
        return ExitCode::from(EXIT_CONFIG);
    }

    print_summary(&outcome.verdict);

    if outcome.verdict.overall.is_pass() {
        ExitCode::from(EXIT_PASS)
    } else {
        ExitCode::from(EXIT_FAIL)
    }
}

fn emit_artifacts(cli: &GauntletCli, outcome: &RunOutcome) -> anyhow::Result<()> {
    let report_path = write_report(&outcome.verdict, &cli.out_dir)?;
    log::info!("Wrote report to '{}'", report_path.display());

    let artifact = RunArtifact::new(
        outcome.run_id.clone(),
        cli.registry.clone(),
        outcome.started_at,
        outcome.verdict.clone(),
    );
    let artifact_path = write_verdict_json(&artifact, &cli.out_dir)?;
    log::info!("Wrote verdict to '{}'", artifact_path.display());

    let record = RunRecord::new(
        outcome.run_id.clone(),
        outcome.verdict.overall,
        outcome.verdict.counts,
        outcome.started_at,
    );
    append_run_record(&record, cli.out_dir.join(HISTORY_FILE_NAME))?;

    Ok(())
}
