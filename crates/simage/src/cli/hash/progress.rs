//! Progress bar and end-of-run summary.

use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

/// Create a progress bar over `total` images.
pub fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    match ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
    ) {
        Ok(style) => pb.set_style(style.progress_chars("##-")),
        Err(e) => tracing::debug!("Falling back to the default progress style: {e}"),
    }
    pb.set_message("starting...");
    pb
}

/// Message shown next to the bar while work is in flight.
pub fn buffer_message(level: usize, max: usize) -> String {
    format!("buffer {level}/{max}")
}

/// Totals printed once a run ends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub hashed: usize,
    pub failed: usize,
    /// Already in the record store and not hashed again
    pub skipped: usize,
    /// Left unhashed because the run was interrupted
    pub interrupted: usize,
    pub elapsed: Duration,
    pub output: PathBuf,
}

impl RunSummary {
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.hashed + self.failed) as f64 / secs
        } else {
            0.0
        }
    }

    pub fn print(&self) {
        let total = self.hashed + self.failed + self.skipped + self.interrupted;

        eprintln!();
        eprintln!("  ====================================");
        eprintln!("               Summary");
        eprintln!("  ====================================");
        eprintln!("    Hashed:       {:>8}", self.hashed);
        if self.failed > 0 {
            eprintln!("    Bad files:    {:>8}", self.failed);
        }
        if self.skipped > 0 {
            eprintln!("    Skipped:      {:>8}", self.skipped);
        }
        if self.interrupted > 0 {
            eprintln!("    Interrupted:  {:>8}", self.interrupted);
        }
        eprintln!("  ------------------------------------");
        eprintln!("    Total:        {:>8}", total);
        eprintln!("    Duration:     {:>7.1}s", self.elapsed.as_secs_f64());
        eprintln!("    Rate:         {:>7.1} img/sec", self.rate());
        eprintln!("    Records:      {}", self.output.display());
        eprintln!("  ====================================");
    }
}
