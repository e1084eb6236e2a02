use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io::{BufRead, Write};
use std::path::PathBuf;

/// Terminal status of a single scenario within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScenarioStatus {
    /// The scenario ran and exited with an allow-listed exit code.
    Pass,
    /// The scenario ran and exited with a code that is not allow-listed, or was killed by a
    /// signal.
    Fail,
    /// The scenario could not be launched.
    Error,
    /// The scenario exceeded its allotted time and was forcibly terminated.
    Timeout,
    /// The scenario was expected to run but no result was ever recorded for it.
    Missing,
}

impl ScenarioStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioStatus::Pass => "PASS",
            ScenarioStatus::Fail => "FAIL",
            ScenarioStatus::Error => "ERROR",
            ScenarioStatus::Timeout => "TIMEOUT",
            ScenarioStatus::Missing => "MISSING",
        }
    }
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The aggregated outcome of a full run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Overall {
    Pass,
    Fail,
}

impl Overall {
    pub fn is_pass(&self) -> bool {
        matches!(self, Overall::Pass)
    }
}

impl fmt::Display for Overall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Overall::Pass => "PASS",
            Overall::Fail => "FAIL",
        })
    }
}

/// Outcome record for a single scenario
///
/// Created exactly once per scenario per run, either by the invoker when the scenario
/// terminates or synthesised by [Verdict::evaluate] when no result was recorded. Immutable
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioResult {
    /// The scenario id this result belongs to
    pub id: String,
    /// The terminal status
    pub status: ScenarioStatus,
    /// The exit code of the scenario process
    ///
    /// Not set when the process was killed by a signal, or for ERROR/TIMEOUT/MISSING results.
    pub exit_code: Option<i32>,
    /// Where the captured stdout was written
    ///
    /// Output is referenced rather than embedded so that results stay small regardless of how
    /// chatty a scenario is.
    pub stdout_log: Option<PathBuf>,
    /// Where the captured stderr was written
    pub stderr_log: Option<PathBuf>,
    /// The time the scenario process was spawned
    ///
    /// This is a Unix timestamp in seconds. Not set for synthetic results.
    pub started_at: Option<i64>,
    /// The time the scenario process terminated
    ///
    /// This is a Unix timestamp in seconds. Not set for synthetic results.
    pub finished_at: Option<i64>,
    /// Wall-clock duration of the scenario, in milliseconds
    ///
    /// Zero for results that never ran.
    pub duration_ms: u64,
    /// One line of context for non-PASS results
    ///
    /// For FAIL this is the first line the scenario wrote to stdout (falling back to stderr).
    /// ERROR/TIMEOUT/MISSING results carry a deterministic synthetic line instead.
    pub detail: Option<String>,
}

impl ScenarioResult {
    /// The synthetic result recorded for an expected scenario that never produced one.
    pub fn missing(id: String) -> Self {
        Self {
            id,
            status: ScenarioStatus::Missing,
            exit_code: None,
            stdout_log: None,
            stderr_log: None,
            started_at: None,
            finished_at: None,
            duration_ms: 0,
            detail: Some("no result recorded".to_string()),
        }
    }
}

/// Per-status tally across one run
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub pass: usize,
    pub fail: usize,
    pub error: usize,
    pub timeout: usize,
    pub missing: usize,
}

impl StatusCounts {
    pub fn tally(results: &[ScenarioResult]) -> Self {
        let mut counts = Self::default();
        for result in results {
            match result.status {
                ScenarioStatus::Pass => counts.pass += 1,
                ScenarioStatus::Fail => counts.fail += 1,
                ScenarioStatus::Error => counts.error += 1,
                ScenarioStatus::Timeout => counts.timeout += 1,
                ScenarioStatus::Missing => counts.missing += 1,
            }
        }
        counts
    }

    /// The number of results counted. Always equals the number of expected scenarios once a
    /// verdict has been evaluated.
    pub fn total(&self) -> usize {
        self.pass + self.fail + self.error + self.timeout + self.missing
    }
}

/// The authoritative outcome of a run
///
/// Derived from the expected scenario set and the collected results, never persisted on its
/// own; anything that stores a verdict stores the contributing results with it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    /// PASS only when every expected scenario passed
    pub overall: Overall,
    /// Per-status tally over [Verdict::results]
    pub counts: StatusCounts,
    /// One result per expected scenario, sorted by id
    pub results: Vec<ScenarioResult>,
    /// The time the verdict was computed
    ///
    /// This is a Unix timestamp in seconds.
    pub generated_at: i64,
}

impl Verdict {
    /// Fold the collected results into the verdict for the run.
    ///
    /// Every id in `expected_ids` contributes exactly one row: its recorded result if there is
    /// one, otherwise a synthetic MISSING result. Absence of evidence is failure, so `overall`
    /// is PASS only when every expected id resolved to a PASS result. Results for ids outside
    /// `expected_ids` do not contribute.
    ///
    /// Rows are sorted by scenario id, not completion order, so that two runs with identical
    /// outcomes produce identical row ordering no matter how execution interleaved.
    pub fn evaluate(expected_ids: &[String], results: Vec<ScenarioResult>) -> Self {
        let mut by_id: HashMap<String, ScenarioResult> = results
            .into_iter()
            .map(|result| (result.id.clone(), result))
            .collect();

        let mut rows = Vec::with_capacity(expected_ids.len());
        for id in expected_ids {
            match by_id.remove(id) {
                Some(result) => rows.push(result),
                None => rows.push(ScenarioResult::missing(id.clone())),
            }
        }
        rows.sort_by_key(|result| result.id.clone());

        let counts = StatusCounts::tally(&rows);
        let overall = if rows.iter().all(|result| result.status == ScenarioStatus::Pass) {
            Overall::Pass
        } else {
            Overall::Fail
        };

        Self {
            overall,
            counts,
            results: rows,
            generated_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// One line of the append-only run history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    /// The unique run id
    ///
    /// Chosen by the runner. Unique for each run.
    pub run_id: String,
    /// The overall outcome of the run
    pub overall: Overall,
    /// Per-status tally for the run
    pub counts: StatusCounts,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
}

impl RunRecord {
    pub fn new(run_id: String, overall: Overall, counts: StatusCounts, started_at: i64) -> Self {
        Self {
            run_id,
            overall,
            counts,
            started_at,
        }
    }
}

/// Append the run record to a history file
///
/// The record will be serialized to JSON and output as a single line followed by a newline.
/// The recommended file extension is `.jsonl`.
pub fn append_run_record(record: &RunRecord, path: PathBuf) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_record(record, &mut file)?;
    let _ = file.write("\n".as_bytes())?;
    Ok(())
}

/// Serialize the run record to a writer
pub fn store_run_record<W: Write>(record: &RunRecord, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, record)?;
    Ok(())
}

/// Load run records from a history file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_run_record].
pub fn load_run_records(path: PathBuf) -> anyhow::Result<Vec<RunRecord>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let record: RunRecord = serde_json::from_str(&line)?;
        records.push(record);
    }
    Ok(records)
}
