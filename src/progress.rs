// src/progress.rs
//
// Progress bars for folder transfers. The pipelines only see
// `ProgressCallback`; the CLI owns the bars.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Byte-oriented progress bar with an "n/m files" message.
pub struct TransferProgressTracker {
    pub multi: MultiProgress,
    pub progress_bar: ProgressBar,
}

impl TransferProgressTracker {
    pub fn new(operation: &str, total_files: u64, total_bytes: u64) -> Self {
        let multi = MultiProgress::new();
        let pb = multi.add(ProgressBar::new(total_bytes));

        let template = format!(
            "{}: {{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}) {{msg}}",
            operation
        );
        pb.set_style(
            ProgressStyle::default_bar()
                .template(&template)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        pb.set_message(format!("0/{} files", total_files));

        Self { multi, progress_bar: pb }
    }

    pub fn update(&self, bytes_transferred: u64, files_completed: u64, total_files: u64) {
        self.progress_bar.set_position(bytes_transferred);
        if total_files > 0 {
            self.progress_bar.set_message(format!("{}/{} files", files_completed, total_files));
        } else {
            self.progress_bar.set_message(format!("{} files", files_completed));
        }
    }

    /// Grow the bar when the total is only discovered while walking.
    pub fn set_total_bytes(&self, total_bytes: u64) {
        self.progress_bar.set_length(total_bytes);
    }

    pub fn finish(&self, operation: &str, total_bytes: u64, duration: Duration) {
        let secs = duration.as_secs_f64().max(f64::EPSILON);
        let mib = total_bytes as f64 / 1_048_576.0;
        self.progress_bar.finish_with_message(format!(
            "{} complete! {:.2} MiB in {:.2}s ({:.2} MiB/s)",
            operation,
            mib,
            duration.as_secs_f64(),
            mib / secs
        ));
    }

    /// Spinner for steps with no meaningful size, such as archive fetches.
    pub fn spinner(operation: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template(&format!("{}: {{spinner:.green}} {{msg}}", operation))
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}

/// Per-file completion counter handed to the transfer pipelines.
pub struct ProgressCallback {
    tracker: Option<Arc<TransferProgressTracker>>,
    pub files_completed: AtomicU64,
    pub bytes_transferred: AtomicU64,
    pub total_files: u64,
}

impl ProgressCallback {
    pub fn new(tracker: Arc<TransferProgressTracker>, total_files: u64) -> Self {
        Self {
            tracker: Some(tracker),
            files_completed: AtomicU64::new(0),
            bytes_transferred: AtomicU64::new(0),
            total_files,
        }
    }

    /// Counter without a bar attached.
    pub fn silent(total_files: u64) -> Self {
        Self {
            tracker: None,
            files_completed: AtomicU64::new(0),
            bytes_transferred: AtomicU64::new(0),
            total_files,
        }
    }

    pub fn file_completed(&self, bytes: u64) {
        let completed = self.files_completed.fetch_add(1, Ordering::Relaxed) + 1;
        let total_bytes = self.bytes_transferred.fetch_add(bytes, Ordering::Relaxed) + bytes;
        if let Some(tracker) = &self.tracker {
            tracker.update(total_bytes, completed, self.total_files);
        }
    }

    pub fn update_total_bytes(&self, total_bytes: u64) {
        if let Some(tracker) = &self.tracker {
            tracker.set_total_bytes(total_bytes);
        }
    }

    pub fn completed(&self) -> u64 {
        self.files_completed.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes_transferred.load(Ordering::Relaxed)
    }
}
