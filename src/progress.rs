//! Progress reporting for batch runs.
//!
//! The batch aggregator is the only caller of a [`ProgressSink`]; workers
//! never touch it directly. [`TerminalProgress`] renders an indicatif bar,
//! [`NullProgress`] discards everything.
//!
//! # Accessible Mode
//!
//! When accessible mode is enabled, progress reporting uses simplified output:
//! - No spinners or animations
//! - ASCII bar characters
//! - One plain line per analyzed file instead of an updating message

use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use crate::cache::AnalysisRecord;

/// Default number of completed files before an ETA is shown.
pub const DEFAULT_ETA_WARMUP: usize = 3;

/// Receives batch progress events.
pub trait ProgressSink: Send + Sync {
    /// Enumeration finished; `total` candidates will be processed.
    fn on_start(&self, total: usize);

    /// A worker began analyzing `path`.
    fn on_started(&self, _path: &Path) {}

    /// A file was analyzed. `eta` is the estimated time left, once known.
    fn on_completed(&self, record: &AnalysisRecord, eta: Option<Duration>);

    /// A file was fresh in the cache.
    fn on_skipped(&self, _path: &Path) {}

    /// A file could not be hashed.
    fn on_unresolved(&self, _path: &Path, _reason: &str) {}

    /// The batch ended, normally or by interruption.
    fn on_finish(&self, interrupted: bool);
}

/// Sink that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn on_start(&self, _total: usize) {}
    fn on_completed(&self, _record: &AnalysisRecord, _eta: Option<Duration>) {}
    fn on_finish(&self, _interrupted: bool) {}
}

/// Terminal progress bar using indicatif.
pub struct TerminalProgress {
    bar: Mutex<Option<ProgressBar>>,
    quiet: bool,
    accessible: bool,
}

impl TerminalProgress {
    /// Create a new progress reporter.
    ///
    /// # Examples
    ///
    /// ```
    /// use hifirate::progress::TerminalProgress;
    ///
    /// let progress = TerminalProgress::new(false, false);
    /// assert!(!progress.is_accessible());
    /// ```
    #[must_use]
    pub fn new(quiet: bool, accessible: bool) -> Self {
        Self {
            bar: Mutex::new(None),
            quiet,
            accessible,
        }
    }

    #[must_use]
    pub fn is_accessible(&self) -> bool {
        self.accessible
    }

    fn style(&self) -> ProgressStyle {
        if self.accessible {
            ProgressStyle::with_template("[{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-")
        } else {
            ProgressStyle::with_template(
                "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█>-")
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(pb) = guard.as_ref() {
                f(pb);
            }
        }
    }
}

impl ProgressSink for TerminalProgress {
    fn on_start(&self, total: usize) {
        if self.quiet {
            return;
        }
        let pb = ProgressBar::new(total as u64);
        pb.set_style(self.style());
        pb.set_message("Analyzing");
        if let Ok(mut guard) = self.bar.lock() {
            *guard = Some(pb);
        }
    }

    fn on_started(&self, path: &Path) {
        if self.accessible {
            return;
        }
        let name = truncate_path(&path.to_string_lossy(), 30);
        self.with_bar(|pb| pb.set_message(name));
    }

    fn on_completed(&self, record: &AnalysisRecord, eta: Option<Duration>) {
        let line = format!(
            "{} -> {} Hz, rating {}%{}",
            record.file_name(),
            record.max_reliable_frequency_hz,
            record.rating,
            eta.map(|d| format!(" (ETA {})", format_eta(d)))
                .unwrap_or_default()
        );
        let accessible = self.accessible;
        self.with_bar(|pb| {
            pb.inc(1);
            if accessible {
                pb.println(&line);
            } else {
                pb.set_message(line);
            }
        });
    }

    fn on_skipped(&self, _path: &Path) {
        self.with_bar(|pb| pb.inc(1));
    }

    fn on_unresolved(&self, _path: &Path, _reason: &str) {
        self.with_bar(|pb| pb.inc(1));
    }

    fn on_finish(&self, interrupted: bool) {
        let Ok(mut guard) = self.bar.lock() else {
            return;
        };
        if let Some(pb) = guard.take() {
            if interrupted {
                pb.abandon_with_message("Interrupted");
            } else {
                pb.finish_with_message("Analysis complete");
            }
        }
    }
}

/// Rolling time-remaining estimate for a batch.
#[derive(Debug, Clone)]
pub struct EtaEstimator {
    started: Instant,
    total: usize,
    completed: usize,
    warmup: usize,
}

impl EtaEstimator {
    /// Start timing a batch of `total` files.
    #[must_use]
    pub fn new(total: usize, warmup: usize) -> Self {
        Self {
            started: Instant::now(),
            total,
            completed: 0,
            warmup,
        }
    }

    /// Count one finished file and return the current estimate.
    pub fn record_completion(&mut self) -> Option<Duration> {
        self.completed += 1;
        self.current()
    }

    /// Estimate without counting a completion.
    #[must_use]
    pub fn current(&self) -> Option<Duration> {
        estimate(
            self.started.elapsed(),
            self.completed,
            self.total.saturating_sub(self.completed),
            self.warmup,
        )
    }

    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed
    }
}

/// `elapsed / completed * remaining`, or `None` during warm-up.
#[must_use]
pub fn estimate(
    elapsed: Duration,
    completed: usize,
    remaining: usize,
    warmup: usize,
) -> Option<Duration> {
    if completed == 0 || completed < warmup {
        return None;
    }
    let per_item = elapsed.as_secs_f64() / completed as f64;
    Some(Duration::from_secs_f64(per_item * remaining as f64))
}

/// Render a duration as `1h 02m 03s`, `2m 05s` or `7s`.
#[must_use]
pub fn format_eta(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

/// Truncate a path for display in the progress bar.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let count = file_name.chars().count();
    if count >= max_len {
        let tail: String = file_name.chars().skip(count + 3 - max_len).collect();
        return format!("...{tail}");
    }

    format!(".../{file_name}")
}
