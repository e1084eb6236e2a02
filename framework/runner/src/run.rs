use std::sync::Arc;

use anyhow::Context;
use futures::future::join_all;
use gauntlet_core::prelude::CancelHandle;
use gauntlet_verdict_model::Verdict;
use tokio::sync::Semaphore;

use crate::cli::GauntletCli;
use crate::collector::{Collector, CollectorError};
use crate::interrupt::start_interrupt_listener;
use crate::invoker::Invoker;
use crate::progress::start_progress;
use crate::registry::Registry;

/// Why a run ended without producing a verdict.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Run interrupted before all scenarios completed")]
    Interrupted,
    #[error(transparent)]
    Collector(#[from] CollectorError),
    #[error(transparent)]
    Setup(#[from] anyhow::Error),
}

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub started_at: i64,
    pub verdict: Verdict,
}

/// Run every expected scenario in the registry and fold the results into a verdict.
///
/// One task is spawned per scenario, optionally bounded by `--jobs`, and the verdict is only
/// computed once every task has finished. A scenario that never records a result shows up in
/// the verdict as MISSING. An interrupted run returns [RunError::Interrupted] instead of a
/// verdict so that a half-finished run can never be mistaken for evidence.
pub async fn run(cli: &GauntletCli, registry: &Registry) -> Result<RunOutcome, RunError> {
    let run_id = cli.run_id.clone().unwrap_or_else(|| nanoid::nanoid!());
    let started_at = chrono::Utc::now().timestamp();

    for spec in registry.disabled() {
        log::info!(
            "Scenario {} is registered but not expected to run, skipping",
            spec.id
        );
    }

    let expected: Vec<_> = registry.expected().cloned().collect();
    let expected_ids = registry.expected_ids();

    log::info!("Running {} scenarios for run {run_id}", expected.len());

    std::fs::create_dir_all(&cli.out_dir).with_context(|| {
        format!("Failed to create output directory '{}'", cli.out_dir.display())
    })?;

    let invoker = Arc::new(Invoker::new(run_id.clone(), &cli.out_dir)?);
    let collector = Arc::new(Collector::new(expected_ids.iter().cloned()));

    let cancel = CancelHandle::new();
    start_interrupt_listener(&cancel);

    let progress = (!cli.no_progress).then(|| start_progress(expected.len() as u64));
    let limiter = cli.jobs.map(|jobs| Arc::new(Semaphore::new(jobs.get())));

    let mut handles = Vec::with_capacity(expected.len());
    for spec in expected {
        let invoker = invoker.clone();
        let collector = collector.clone();
        let cancel_listener = cancel.new_listener();
        let limiter = limiter.clone();
        let progress = progress.clone();

        handles.push(tokio::spawn(async move {
            let _permit = match &limiter {
                Some(limiter) => limiter.acquire().await.ok(),
                None => None,
            };

            let result = invoker.invoke(&spec, cancel_listener).await;

            if let Some(progress) = &progress {
                progress.inc(1);
            }

            match result {
                Some(result) => collector.submit(result),
                // The run was cancelled whilst the scenario was in flight, nothing to record.
                None => Ok(()),
            }
        }));
    }

    // The join point: every scenario has exited, timed out, or been killed by the time this
    // returns, so no orphaned child can outlive the run.
    let joined = join_all(handles).await;

    if let Some(progress) = progress {
        progress.finish_and_clear();
    }

    if cancel.is_cancelled() {
        return Err(RunError::Interrupted);
    }

    for join_result in joined {
        match join_result {
            Ok(submitted) => submitted?,
            // A panicked scenario task leaves its slot empty and surfaces as MISSING.
            Err(e) => log::error!("Scenario task failed: {e:?}"),
        }
    }

    Ok(RunOutcome {
        run_id,
        started_at,
        verdict: Verdict::evaluate(&expected_ids, collector.results()),
    })
}
