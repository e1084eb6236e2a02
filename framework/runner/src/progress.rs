use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Displays a progress bar while scenarios are running to show the user how many are done.
pub(crate) fn start_progress(total_scenarios: u64) -> ProgressBar {
    let pb = ProgressBar::new(total_scenarios);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{wide_bar:.cyan/blue}] {pos}/{len} scenarios [{elapsed_precise}]",
        )
        .expect("Failed to set progress style")
        .progress_chars("#>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
