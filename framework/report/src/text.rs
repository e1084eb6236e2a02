use anyhow::Context;
use gauntlet_verdict_model::Verdict;
use std::path::{Path, PathBuf};

/// File name of the text report within the output directory
const REPORT_FILE_NAME: &str = "report.txt";

/// Render the verdict as the diffable evidence artifact.
///
/// One tab-separated row per scenario in id order, `id`, `status`, `duration_ms`, `detail`,
/// followed by a trailing `OVERALL:` line. The rendering carries no timestamps, so two runs
/// with identical outcomes produce byte-identical reports apart from the duration column.
pub fn render_report(verdict: &Verdict) -> String {
    let mut report = String::new();
    for result in &verdict.results {
        // Detail is free text from the scenario, flatten anything that would break the
        // one-row-per-scenario shape.
        let detail = result
            .detail
            .as_deref()
            .unwrap_or("-")
            .replace(['\t', '\n'], " ");
        report.push_str(&format!(
            "{}\t{}\t{}\t{}\n",
            result.id, result.status, result.duration_ms, detail
        ));
    }
    report.push_str(&format!("OVERALL: {}\n", verdict.overall));
    report
}

/// Write the text report into the output directory, replacing any previous one.
pub fn write_report(verdict: &Verdict, out_dir: &Path) -> anyhow::Result<PathBuf> {
    let path = out_dir.join(REPORT_FILE_NAME);
    std::fs::write(&path, render_report(verdict))
        .with_context(|| format!("Failed to write report to '{}'", path.display()))?;
    Ok(path)
}
