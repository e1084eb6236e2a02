use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::Context;
use chrono::Utc;
use gauntlet_core::prelude::CancelListener;
use gauntlet_verdict_model::{ScenarioResult, ScenarioStatus};
use tokio::process::{Child, Command};
use tokio::time::{timeout, Instant};

use crate::registry::ScenarioSpec;

enum WaitOutcome {
    Finished(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Runs scenarios as child processes and classifies how they ended.
///
/// Each scenario gets its own log files under `<out>/logs` and, unless the registry pins a
/// working directory, its own scratch directory under `<out>/work` so that scenarios cannot
/// observe each other through the filesystem.
#[derive(Debug)]
pub struct Invoker {
    run_id: String,
    logs_dir: PathBuf,
    work_dir: PathBuf,
}

impl Invoker {
    pub fn new(run_id: String, out_dir: &Path) -> anyhow::Result<Self> {
        let logs_dir = out_dir.join("logs");
        std::fs::create_dir_all(&logs_dir).with_context(|| {
            format!("Failed to create log directory '{}'", logs_dir.display())
        })?;

        let work_dir = out_dir.join("work");
        std::fs::create_dir_all(&work_dir).with_context(|| {
            format!("Failed to create work directory '{}'", work_dir.display())
        })?;

        Ok(Self {
            run_id,
            logs_dir,
            work_dir,
        })
    }

    /// Run the scenario to completion and classify the outcome.
    ///
    /// Exactly one invocation attempt is made, there are no retries. A scenario that outlives
    /// its timeout is forcibly killed and recorded as TIMEOUT. Returns [None] when the run was
    /// cancelled whilst the scenario was still in flight; the child is killed and nothing is
    /// recorded.
    pub async fn invoke(
        &self,
        spec: &ScenarioSpec,
        mut cancel: CancelListener,
    ) -> Option<ScenarioResult> {
        if cancel.is_cancelled() {
            return None;
        }

        let started_at = Utc::now().timestamp();
        let started = Instant::now();

        let stdout_log = self.logs_dir.join(format!("{}.stdout.log", spec.id));
        let stderr_log = self.logs_dir.join(format!("{}.stderr.log", spec.id));

        let mut child = match self.launch(spec, &stdout_log, &stderr_log) {
            Ok(child) => child,
            Err(e) => {
                log::error!("Failed to launch scenario {}: {e:?}", spec.id);
                return Some(ScenarioResult {
                    id: spec.id.clone(),
                    status: ScenarioStatus::Error,
                    exit_code: None,
                    // Launch can fail after the log files have been created, reference them
                    // only when they are actually on disk.
                    stdout_log: stdout_log.exists().then(|| stdout_log.clone()),
                    stderr_log: stderr_log.exists().then(|| stderr_log.clone()),
                    started_at: Some(started_at),
                    finished_at: Some(Utc::now().timestamp()),
                    duration_ms: started.elapsed().as_millis() as u64,
                    detail: Some(format!("{e:#}")),
                });
            }
        };

        log::debug!("Scenario {} started", spec.id);

        let waited = tokio::select! {
            waited = timeout(spec.timeout, child.wait()) => match waited {
                Ok(exit) => WaitOutcome::Finished(exit),
                Err(_) => WaitOutcome::TimedOut,
            },
            _ = cancel.cancelled() => WaitOutcome::Cancelled,
        };

        let (status, exit_code, detail) = match waited {
            WaitOutcome::Finished(Ok(exit_status)) => match exit_status.code() {
                Some(code) if spec.allowed_exit_codes.contains(&code) => {
                    (ScenarioStatus::Pass, Some(code), None)
                }
                Some(code) => (
                    ScenarioStatus::Fail,
                    Some(code),
                    first_output_line(&stdout_log, &stderr_log),
                ),
                // No exit code means the process was killed by a signal. The scenario did run,
                // so this is a failure rather than a launch error.
                None => (
                    ScenarioStatus::Fail,
                    None,
                    Some("terminated by signal".to_string()),
                ),
            },
            WaitOutcome::Finished(Err(e)) => {
                log::error!("Failed to wait for scenario {}: {e}", spec.id);
                (
                    ScenarioStatus::Error,
                    None,
                    Some(format!("Failed to wait for scenario process: {e}")),
                )
            }
            WaitOutcome::TimedOut => {
                log::warn!(
                    "Scenario {} timed out after {}s, killing it",
                    spec.id,
                    spec.timeout.as_secs()
                );
                if let Err(e) = child.kill().await {
                    log::error!("Failed to kill timed out scenario {}: {e}", spec.id);
                }
                (
                    ScenarioStatus::Timeout,
                    None,
                    Some(format!("timed out after {}s", spec.timeout.as_secs())),
                )
            }
            WaitOutcome::Cancelled => {
                log::info!("Cancelling scenario {}", spec.id);
                if let Err(e) = child.kill().await {
                    log::error!("Failed to kill cancelled scenario {}: {e}", spec.id);
                }
                return None;
            }
        };

        log::info!("Scenario {} finished: {status}", spec.id);

        Some(ScenarioResult {
            id: spec.id.clone(),
            status,
            exit_code,
            stdout_log: Some(stdout_log),
            stderr_log: Some(stderr_log),
            started_at: Some(started_at),
            finished_at: Some(Utc::now().timestamp()),
            duration_ms: started.elapsed().as_millis() as u64,
            detail,
        })
    }

    fn launch(
        &self,
        spec: &ScenarioSpec,
        stdout_log: &Path,
        stderr_log: &Path,
    ) -> anyhow::Result<Child> {
        let working_dir = match &spec.working_dir {
            Some(dir) => dir.clone(),
            None => {
                let dir = self.work_dir.join(&spec.id);
                std::fs::create_dir_all(&dir).with_context(|| {
                    format!("Failed to create scratch directory '{}'", dir.display())
                })?;
                dir
            }
        };

        let stdout_file = File::create(stdout_log).with_context(|| {
            format!("Failed to create stdout log '{}'", stdout_log.display())
        })?;
        let stderr_file = File::create(stderr_log).with_context(|| {
            format!("Failed to create stderr log '{}'", stderr_log.display())
        })?;

        let child = Command::new(&spec.command)
            .args(&spec.args)
            .envs(&spec.env)
            .env("GAUNTLET_RUN_ID", &self.run_id)
            .env("GAUNTLET_SCENARIO_ID", &spec.id)
            .current_dir(&working_dir)
            .stdin(Stdio::null())
            .stdout(stdout_file)
            .stderr(stderr_file)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn scenario '{}'", spec.id))?;

        Ok(child)
    }
}

/// The first non-empty line the scenario wrote, preferring stdout over stderr.
///
/// The attack runners print their verdict explanation as the first stdout line, so this is
/// what ends up in the report's detail column for failures.
fn first_output_line(stdout_log: &Path, stderr_log: &Path) -> Option<String> {
    first_line(stdout_log).or_else(|| first_line(stderr_log))
}

fn first_line(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    BufReader::new(file)
        .lines()
        .map_while(|line| line.ok())
        .map(|line| line.trim_end().to_string())
        .find(|line| !line.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauntlet_core::prelude::CancelHandle;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    fn sh_spec(id: &str, script: &str, timeout_s: u64) -> ScenarioSpec {
        ScenarioSpec {
            id: id.to_string(),
            command: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            env: HashMap::new(),
            working_dir: None,
            timeout: Duration::from_secs(timeout_s),
            allowed_exit_codes: vec![0],
            expected: true,
        }
    }

    fn invoker_in(dir: &Path) -> Invoker {
        Invoker::new("test-run".to_string(), dir).expect("Failed to create invoker")
    }

    #[tokio::test]
    async fn passing_scenario_yields_pass() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let cancel = CancelHandle::new();

        let result = invoker_in(dir.path())
            .invoke(&sh_spec("attack-01", "exit 0", 10), cancel.new_listener())
            .await
            .expect("Scenario should have produced a result");

        assert_eq!(ScenarioStatus::Pass, result.status);
        assert_eq!(Some(0), result.exit_code);
        assert_eq!(None, result.detail);
        assert!(result.stdout_log.as_deref().is_some_and(Path::exists));
        assert!(result.stderr_log.as_deref().is_some_and(Path::exists));
    }

    #[tokio::test]
    async fn failing_scenario_captures_first_stdout_line() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let cancel = CancelHandle::new();

        let result = invoker_in(dir.path())
            .invoke(
                &sh_spec(
                    "attack-02",
                    "echo 'expected rejection, got acceptance'; echo 'more output'; exit 1",
                    10,
                ),
                cancel.new_listener(),
            )
            .await
            .expect("Scenario should have produced a result");

        assert_eq!(ScenarioStatus::Fail, result.status);
        assert_eq!(Some(1), result.exit_code);
        assert_eq!(
            Some("expected rejection, got acceptance".to_string()),
            result.detail
        );
    }

    #[tokio::test]
    async fn failing_scenario_falls_back_to_stderr_for_detail() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let cancel = CancelHandle::new();

        let result = invoker_in(dir.path())
            .invoke(
                &sh_spec("attack-03", "echo boom >&2; exit 7", 10),
                cancel.new_listener(),
            )
            .await
            .expect("Scenario should have produced a result");

        assert_eq!(ScenarioStatus::Fail, result.status);
        assert_eq!(Some(7), result.exit_code);
        assert_eq!(Some("boom".to_string()), result.detail);
    }

    #[tokio::test]
    async fn detail_skips_blank_stdout_lines() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let cancel = CancelHandle::new();

        let result = invoker_in(dir.path())
            .invoke(
                &sh_spec(
                    "blank-first",
                    "echo; echo 'nonce accepted twice'; echo ignored >&2; exit 1",
                    10,
                ),
                cancel.new_listener(),
            )
            .await
            .expect("Scenario should have produced a result");

        assert_eq!(ScenarioStatus::Fail, result.status);
        // Stdout has content below the blank line, so stderr must not win.
        assert_eq!(Some("nonce accepted twice".to_string()), result.detail);
    }

    #[tokio::test]
    async fn allow_listed_exit_code_passes() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let cancel = CancelHandle::new();

        let mut spec = sh_spec("attack-04", "exit 3", 10);
        spec.allowed_exit_codes = vec![0, 3];

        let result = invoker_in(dir.path())
            .invoke(&spec, cancel.new_listener())
            .await
            .expect("Scenario should have produced a result");

        assert_eq!(ScenarioStatus::Pass, result.status);
        assert_eq!(Some(3), result.exit_code);
    }

    #[tokio::test]
    async fn timed_out_scenario_is_killed_and_recorded() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let cancel = CancelHandle::new();
        let before = std::time::Instant::now();

        let result = invoker_in(dir.path())
            .invoke(&sh_spec("slow", "sleep 30", 1), cancel.new_listener())
            .await
            .expect("Scenario should have produced a result");

        // The scenario is killed when the timeout fires rather than being waited out.
        assert!(before.elapsed() < Duration::from_secs(10));
        assert_eq!(ScenarioStatus::Timeout, result.status);
        assert_eq!(None, result.exit_code);
        assert_eq!(Some("timed out after 1s".to_string()), result.detail);
    }

    #[tokio::test]
    async fn unlaunchable_scenario_yields_error() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let cancel = CancelHandle::new();

        let mut spec = sh_spec("ghost", "exit 0", 10);
        spec.command = "/definitely/not/a/real/binary".to_string();

        let result = invoker_in(dir.path())
            .invoke(&spec, cancel.new_listener())
            .await
            .expect("Scenario should have produced a result");

        assert_eq!(ScenarioStatus::Error, result.status);
        assert_eq!(None, result.exit_code);
        assert!(result
            .detail
            .as_deref()
            .is_some_and(|detail| detail.contains("Failed to spawn scenario 'ghost'")));
    }

    #[tokio::test]
    async fn error_result_references_only_log_files_that_exist() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let cancel = CancelHandle::new();

        let mut spec = sh_spec("ghost", "exit 0", 10);
        spec.command = "/definitely/not/a/real/binary".to_string();

        let result = invoker_in(dir.path())
            .invoke(&spec, cancel.new_listener())
            .await
            .expect("Scenario should have produced a result");

        // The log files are created before the spawn attempt, so the result must point at
        // them rather than claiming no output was captured.
        assert!(result.stdout_log.as_deref().is_some_and(Path::exists));
        assert!(result.stderr_log.as_deref().is_some_and(Path::exists));
    }

    #[tokio::test]
    async fn scenario_env_overlay_is_applied() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let cancel = CancelHandle::new();

        let mut spec = sh_spec("env-overlay", r#"test "$ATTACK_MODE" = replay"#, 10);
        spec.env
            .insert("ATTACK_MODE".to_string(), "replay".to_string());

        let result = invoker_in(dir.path())
            .invoke(&spec, cancel.new_listener())
            .await
            .expect("Scenario should have produced a result");

        assert_eq!(ScenarioStatus::Pass, result.status);
    }

    #[tokio::test]
    async fn run_identity_is_exported_to_the_scenario() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let cancel = CancelHandle::new();

        let result = invoker_in(dir.path())
            .invoke(
                &sh_spec(
                    "env-check",
                    r#"test "$GAUNTLET_RUN_ID" = test-run && test "$GAUNTLET_SCENARIO_ID" = env-check"#,
                    10,
                ),
                cancel.new_listener(),
            )
            .await
            .expect("Scenario should have produced a result");

        assert_eq!(ScenarioStatus::Pass, result.status);
    }

    #[tokio::test]
    async fn default_working_dir_is_a_per_scenario_scratch_dir() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let cancel = CancelHandle::new();

        let result = invoker_in(dir.path())
            .invoke(&sh_spec("cwd-check", "pwd", 10), cancel.new_listener())
            .await
            .expect("Scenario should have produced a result");

        assert_eq!(ScenarioStatus::Pass, result.status);
        let stdout_log = result.stdout_log.expect("Missing stdout log path");
        let cwd = first_line(&stdout_log).expect("Scenario did not print its cwd");
        assert!(
            cwd.ends_with("work/cwd-check"),
            "Unexpected scenario cwd: {cwd}"
        );
    }

    #[tokio::test]
    async fn scenario_output_is_captured_in_log_files() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let cancel = CancelHandle::new();

        let result = invoker_in(dir.path())
            .invoke(
                &sh_spec("chatty", "echo out; echo err >&2", 10),
                cancel.new_listener(),
            )
            .await
            .expect("Scenario should have produced a result");

        let stdout = std::fs::read_to_string(result.stdout_log.expect("Missing stdout log path"))
            .expect("Failed to read stdout log");
        let stderr = std::fs::read_to_string(result.stderr_log.expect("Missing stderr log path"))
            .expect("Failed to read stderr log");
        assert_eq!("out\n", stdout);
        assert_eq!("err\n", stderr);
    }

    #[tokio::test]
    async fn cancelled_scenario_is_killed_without_a_result() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let invoker = Arc::new(invoker_in(dir.path()));
        let cancel = CancelHandle::new();
        let listener = cancel.new_listener();

        let task = tokio::spawn({
            let invoker = invoker.clone();
            async move {
                invoker
                    .invoke(&sh_spec("cancel-me", "sleep 30", 60), listener)
                    .await
            }
        });

        // Give the scenario a moment to spawn before cancelling.
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("Cancelled scenario did not stop promptly")
            .expect("Scenario task panicked");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn already_cancelled_run_never_spawns_the_scenario() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let cancel = CancelHandle::new();
        cancel.cancel();

        let marker = dir.path().join("ran");
        let result = invoker_in(dir.path())
            .invoke(
                &sh_spec("late", &format!("touch {}", marker.display()), 10),
                cancel.new_listener(),
            )
            .await;

        assert!(result.is_none());
        assert!(!marker.exists());
    }
}
