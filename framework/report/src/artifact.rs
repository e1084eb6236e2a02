use anyhow::Context;
use gauntlet_verdict_model::Verdict;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};

/// File name of the JSON verdict artifact within the output directory
const VERDICT_FILE_NAME: &str = "verdict.json";

/// The machine-readable evidence artifact for one run
///
/// Embeds the full verdict, results included, so the artifact stands on its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunArtifact {
    /// The unique run id
    pub run_id: String,
    /// The registry the run was configured from
    pub registry: PathBuf,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// The verdict with its contributing results
    pub verdict: Verdict,
}

impl RunArtifact {
    pub fn new(run_id: String, registry: PathBuf, started_at: i64, verdict: Verdict) -> Self {
        Self {
            run_id,
            registry,
            started_at,
            verdict,
        }
    }
}

/// Write the verdict artifact as pretty-printed JSON, replacing any previous one.
///
/// The text report is for diffing, this artifact is for machine consumers; the append-only
/// run history preserves outcomes across runs.
pub fn write_verdict_json(artifact: &RunArtifact, out_dir: &Path) -> anyhow::Result<PathBuf> {
    let path = out_dir.join(VERDICT_FILE_NAME);
    let file = File::create(&path)
        .with_context(|| format!("Failed to create verdict artifact '{}'", path.display()))?;
    serde_json::to_writer_pretty(file, artifact)?;
    Ok(path)
}
