//! Batch analysis over a directory tree.
//!
//! # Pipeline
//!
//! 1. **Enumerate**: walk the root with [`Walker`](crate::scanner::Walker),
//!    keeping audio files that pass the extension and size filters.
//! 2. **Resolve**: on a fixed-size rayon pool, hash every file into a
//!    [`FileIdentity`] and check it against a read-only
//!    [`StalenessIndex`](crate::cache::StalenessIndex) snapshot of the cache.
//! 3. **Analyze**: stale files go through the [`FileAnalyzer`](crate::analysis::FileAnalyzer).
//! 4. **Aggregate**: workers send [`WorkerEvent`]s over a bounded channel to
//!    the calling thread, which alone owns the [`CacheStore`](crate::cache::CacheStore)
//!    and the progress sink.
//!
//! Persisting the cache and writing the report are left to the caller.

pub mod scheduler;
pub mod summary;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::cache::AnalysisRecord;
use crate::progress::{ProgressSink, DEFAULT_ETA_WARMUP};
use crate::scanner::{FileIdentity, WalkerConfig, DEFAULT_BUFFER_SIZE};

pub use scheduler::BatchScheduler;
pub use summary::BatchSummary;

/// Default bound on in-flight worker events.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Errors that abort a whole batch.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The root directory does not exist
    #[error("Root path not found: {0}")]
    RootNotFound(PathBuf),

    /// The root exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The worker pool could not be created
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Message from a worker to the aggregator.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// Analysis of a stale file began
    Started(PathBuf),
    /// The cached record is fresh; nothing was decoded
    Skipped(FileIdentity),
    /// The file could not be hashed
    Unresolved { path: PathBuf, reason: String },
    /// A complete record for a stale file
    Analyzed {
        identity: FileIdentity,
        record: AnalysisRecord,
    },
    /// Work on the file was abandoned because of a shutdown request
    Cancelled(PathBuf),
}

/// Configuration for a batch run.
#[derive(Clone)]
pub struct BatchConfig {
    /// Worker thread count
    pub workers: usize,
    /// Enumeration filters
    pub walker: WalkerConfig,
    /// Read block size for content hashing
    pub hash_buffer_size: usize,
    /// Completed files before an ETA is reported
    pub eta_warmup: usize,
    /// Bound on in-flight worker events
    pub channel_capacity: usize,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress sink.
    pub progress: Option<Arc<dyn ProgressSink>>,
}

impl std::fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchConfig")
            .field("workers", &self.workers)
            .field("walker", &self.walker)
            .field("hash_buffer_size", &self.hash_buffer_size)
            .field("eta_warmup", &self.eta_warmup)
            .field("channel_capacity", &self.channel_capacity)
            .field("shutdown_flag", &self.shutdown_flag)
            .field("progress", &self.progress.as_ref().map(|_| "<progress>"))
            .finish()
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            walker: WalkerConfig::default(),
            hash_buffer_size: DEFAULT_BUFFER_SIZE,
            eta_warmup: DEFAULT_ETA_WARMUP,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            shutdown_flag: None,
            progress: None,
        }
    }
}

impl BatchConfig {
    /// Set the worker count (minimum 1).
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    #[must_use]
    pub fn with_walker(mut self, walker: WalkerConfig) -> Self {
        self.walker = walker;
        self
    }

    #[must_use]
    pub fn with_eta_warmup(mut self, warmup: usize) -> Self {
        self.eta_warmup = warmup;
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress sink.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Check if shutdown has been requested.
    pub(crate) fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Available parallelism, or 1 if it cannot be determined.
#[must_use]
pub fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}
