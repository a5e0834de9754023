//! Bounded-concurrency batch execution with a single aggregation point.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use bytesize::ByteSize;
use crossbeam_channel::Sender;
use rayon::prelude::*;

use super::{BatchConfig, BatchError, BatchSummary, WorkerEvent};
use crate::analysis::{Cancelled, FileAnalyzer};
use crate::cache::{AnalysisRecord, CacheStore, StalenessIndex};
use crate::progress::{EtaEstimator, NullProgress, ProgressSink};
use crate::scanner::{Hasher, Walker};

/// Runs the enumerate / resolve / analyze / aggregate pipeline.
pub struct BatchScheduler {
    config: BatchConfig,
    analyzer: Arc<dyn FileAnalyzer>,
    hasher: Hasher,
}

impl std::fmt::Debug for BatchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("config", &self.config)
            .field("analyzer", &"<analyzer>")
            .finish()
    }
}

/// Candidates found under a root, in walk order.
#[derive(Debug, Clone, Default)]
pub struct Enumeration {
    pub files: Vec<PathBuf>,
    /// Combined size of `files`
    pub total_bytes: u64,
    /// Directory entries that could not be read
    pub scan_errors: usize,
}

/// Smallest path seen for one content hash during a run, with the record
/// produced for it when that path was analyzed rather than skipped.
struct Attribution {
    path: PathBuf,
    record: Option<AnalysisRecord>,
}

/// State owned by the aggregating thread.
struct Aggregator<'a> {
    progress: &'a dyn ProgressSink,
    summary: BatchSummary,
    eta: EtaEstimator,
    attributions: HashMap<String, Attribution>,
}

impl Aggregator<'_> {
    fn observe(&mut self, content_hash: &str, path: &Path, record: Option<AnalysisRecord>) {
        let candidate = Attribution {
            path: path.to_path_buf(),
            record,
        };
        match self.attributions.entry(content_hash.to_string()) {
            Entry::Occupied(mut current) => {
                if candidate.path < current.get().path {
                    current.insert(candidate);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(candidate);
            }
        }
    }

    fn handle(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Started(path) => self.progress.on_started(&path),
            WorkerEvent::Skipped(identity) => {
                log::debug!("Already analyzed: {}", identity.path.display());
                self.summary.skipped += 1;
                self.eta.record_completion();
                self.progress.on_skipped(&identity.path);
                self.observe(&identity.content_hash, &identity.path, None);
            }
            WorkerEvent::Unresolved { path, reason } => {
                self.summary.unresolved += 1;
                self.eta.record_completion();
                self.progress.on_unresolved(&path, &reason);
            }
            WorkerEvent::Analyzed { identity, record } => {
                self.summary.analyzed += 1;
                if record.has_failures() {
                    self.summary.partial_failures += 1;
                }
                let eta = self.eta.record_completion();
                self.progress.on_completed(&record, eta);
                self.observe(&identity.content_hash, &identity.path, Some(record));
            }
            WorkerEvent::Cancelled(path) => {
                log::trace!("Cancelled: {}", path.display());
                self.summary.cancelled += 1;
            }
        }
    }

    /// Apply the records whose path won attribution. A hash whose smallest
    /// path was fresh keeps its stored record untouched.
    fn commit(self, store: &mut CacheStore) -> BatchSummary {
        for (hash, attribution) in self.attributions {
            if let Some(record) = attribution.record {
                store.upsert(hash, record);
            }
        }
        self.summary
    }
}

impl BatchScheduler {
    /// Create a scheduler that analyzes stale files with `analyzer`.
    #[must_use]
    pub fn new(config: BatchConfig, analyzer: Arc<dyn FileAnalyzer>) -> Self {
        let hasher = Hasher::with_buffer_size(config.hash_buffer_size);
        Self {
            config,
            analyzer,
            hasher,
        }
    }

    #[must_use]
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Find candidate files under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError`] if `root` does not exist or is not a directory.
    pub fn enumerate(&self, root: &Path) -> Result<Enumeration, BatchError> {
        if !root.exists() {
            return Err(BatchError::RootNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(BatchError::NotADirectory(root.to_path_buf()));
        }

        let mut walker = Walker::new(root, self.config.walker.clone());
        if let Some(flag) = &self.config.shutdown_flag {
            walker = walker.with_shutdown_flag(Arc::clone(flag));
        }

        let mut enumeration = Enumeration::default();
        for entry in walker.walk() {
            match entry {
                Ok(file) => {
                    enumeration.total_bytes += file.size;
                    enumeration.files.push(file.path);
                }
                Err(e) => {
                    log::warn!("Scan error: {}", e);
                    enumeration.scan_errors += 1;
                }
            }
        }

        log::info!(
            "Found {} audio files ({}) under {}",
            enumeration.files.len(),
            ByteSize::b(enumeration.total_bytes),
            root.display()
        );
        Ok(enumeration)
    }

    /// Enumerate `root` and bring `store` up to date for every candidate.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError`] for an invalid root or if the worker pool
    /// cannot be built. Per-file failures never abort the run.
    pub fn run(&self, root: &Path, store: &mut CacheStore) -> Result<BatchSummary, BatchError> {
        let enumeration = self.enumerate(root)?;
        let mut summary = self.run_files(enumeration.files, store)?;
        summary.scan_errors = enumeration.scan_errors;
        Ok(summary)
    }

    /// Bring `store` up to date for an explicit list of files.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::ThreadPool`] if the worker pool cannot be built.
    pub fn run_files(
        &self,
        files: Vec<PathBuf>,
        store: &mut CacheStore,
    ) -> Result<BatchSummary, BatchError> {
        let started = Instant::now();
        let total = files.len();
        let index = store.staleness_index();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers.max(1))
            .thread_name(|i| format!("hifirate-worker-{i}"))
            .build()?;

        let progress: &dyn ProgressSink = match &self.config.progress {
            Some(p) => p.as_ref(),
            None => &NullProgress,
        };
        progress.on_start(total);

        log::info!(
            "Analyzing {} files with {} workers ({} cached records)",
            total,
            self.config.workers.max(1),
            store.len()
        );

        let mut aggregator = Aggregator {
            progress,
            summary: BatchSummary {
                total,
                ..Default::default()
            },
            eta: EtaEstimator::new(total, self.config.eta_warmup),
            attributions: HashMap::new(),
        };

        let (tx, rx) = crossbeam_channel::bounded(self.config.channel_capacity.max(1));
        std::thread::scope(|scope| {
            let index = &index;
            scope.spawn(move || {
                pool.install(|| {
                    files.into_par_iter().for_each_with(tx, |tx, path| {
                        self.process(path, index, tx);
                    });
                });
            });

            for event in rx.iter() {
                aggregator.handle(event);
            }
        });

        let mut summary = aggregator.commit(store);
        summary.interrupted = self.config.is_shutdown_requested();
        summary.duration = started.elapsed();
        progress.on_finish(summary.interrupted);

        log::info!(
            "Batch finished in {:.1}s: {} analyzed, {} skipped, {} unresolved, {} with failures{}",
            summary.duration.as_secs_f64(),
            summary.analyzed,
            summary.skipped,
            summary.unresolved,
            summary.partial_failures,
            if summary.interrupted {
                " (interrupted)"
            } else {
                ""
            }
        );
        Ok(summary)
    }

    /// Worker body for one file. Sends a terminal event, preceded by
    /// [`WorkerEvent::Started`] when the file is analyzed.
    fn process(&self, path: PathBuf, index: &StalenessIndex, tx: &Sender<WorkerEvent>) {
        let event = self.resolve_and_analyze(path, index, tx);
        // The receiver lives until every sender is dropped.
        let _ = tx.send(event);
    }

    fn resolve_and_analyze(
        &self,
        path: PathBuf,
        index: &StalenessIndex,
        tx: &Sender<WorkerEvent>,
    ) -> WorkerEvent {
        if self.config.is_shutdown_requested() {
            return WorkerEvent::Cancelled(path);
        }

        let identity = match panic::catch_unwind(AssertUnwindSafe(|| self.hasher.identify(&path))) {
            Ok(Ok(identity)) => identity,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::error!("Hashing panicked for {}: {}", path.display(), message);
                return WorkerEvent::Unresolved {
                    path,
                    reason: format!("panicked: {message}"),
                };
            }
            Ok(Err(e)) => {
                log::warn!("Hash error for {}: {}", path.display(), e);
                return WorkerEvent::Unresolved {
                    path,
                    reason: e.to_string(),
                };
            }
        };

        if !index.is_stale(&identity) {
            return WorkerEvent::Skipped(identity);
        }

        if self.config.is_shutdown_requested() {
            return WorkerEvent::Cancelled(path);
        }

        let _ = tx.send(WorkerEvent::Started(path.clone()));
        match panic::catch_unwind(AssertUnwindSafe(|| self.analyzer.analyze(&identity))) {
            Ok(Ok(record)) => WorkerEvent::Analyzed { identity, record },
            Ok(Err(Cancelled)) => WorkerEvent::Cancelled(path),
            Err(payload) => {
                log::error!(
                    "Analysis panicked for {}: {}",
                    path.display(),
                    panic_message(payload.as_ref())
                );
                let record = AnalysisRecord::failed(&identity);
                WorkerEvent::Analyzed { identity, record }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
