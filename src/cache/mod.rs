//! Analysis cache for HifiRate.
//!
//! This module persists analysis results so that subsequent runs skip files
//! whose content and freshness signals are unchanged.
//!
//! # Architecture
//!
//! * [`store`]: JSON persistence with atomic writes, plus the read-only
//!   [`StalenessIndex`] handed to worker threads.
//! * [`entry`]: The [`AnalysisRecord`] model, the per-metric [`Metric`] type
//!   and the staleness rule.
//!
//! # Cache Invalidation
//!
//! Records are keyed by the BLAKE3 hash of the file content. A record is
//! considered stale, and the file re-analyzed, when:
//! * no record exists for the hash,
//! * the stored size or modification time differ from the file on disk, or
//! * any step failed last time (error markers are retried, never cached).

pub mod entry;
pub mod store;

pub use entry::{AnalysisRecord, Metric, FAILED_MARKER, UNKNOWN_MARKER};
pub use store::{CacheError, CacheResult, CacheStore, StalenessIndex, CACHE_FILE_NAME};
