use std::fs;
use std::sync::Arc;
use std::time::Duration;

use filetime::{set_file_mtime, FileTime};
use hifirate::analysis::{AnalyzerConfig, AudioAnalyzer, Cancelled, FileAnalyzer};
use hifirate::batch::BatchError;
use hifirate::cache::{AnalysisRecord, CacheStore, Metric};
use hifirate::scanner::{FileIdentity, Hasher};
use tempfile::tempdir;

use super::fixtures::{
    comparable, default_scheduler, scheduler, write_corrupt, write_library, write_tone,
    CountingAnalyzer,
};

#[test]
fn test_scan_empty_directory() {
    let dir = tempdir().unwrap();
    let mut store = CacheStore::in_memory();

    let summary = default_scheduler(2).run(dir.path(), &mut store).unwrap();

    assert_eq!(summary.total, 0);
    assert_eq!(summary.processed(), 0);
    assert!(store.is_empty());
}

#[test]
fn test_scan_analyzes_every_file() {
    let dir = tempdir().unwrap();
    write_library(dir.path(), 3);
    fs::write(dir.path().join("notes.txt"), vec![b'x'; 2048]).unwrap();

    let mut store = CacheStore::in_memory();
    let summary = default_scheduler(2).run(dir.path(), &mut store).unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.analyzed, 3);
    assert_eq!(summary.partial_failures, 0);
    assert!(!summary.has_issues());
    assert_eq!(store.len(), 3);

    for record in store.records() {
        assert!(!record.has_failures());
        assert!(record.max_reliable_frequency_hz.value().is_some());
        assert_eq!(record.sample_rate_hz, Metric::Value(22_050));
        assert_eq!(record.bit_depth, Metric::Value(16));
        assert!(record.rating > 0);
        assert!(record.analyzed_at.is_some());
    }
}

#[test]
fn test_unchanged_files_do_no_work() {
    let dir = tempdir().unwrap();
    let library = dir.path().join("library");
    write_library(&library, 3);
    let cache_path = dir.path().join("cache.json");

    let mut store = CacheStore::open(&cache_path).unwrap();
    let first = Arc::new(CountingAnalyzer::default());
    scheduler(2, first.clone()).run(&library, &mut store).unwrap();
    store.save().unwrap();
    assert_eq!(first.calls(), 3);
    let saved = fs::read(&cache_path).unwrap();

    let mut store = CacheStore::open(&cache_path).unwrap();
    let second = Arc::new(CountingAnalyzer::default());
    let summary = scheduler(2, second.clone())
        .run(&library, &mut store)
        .unwrap();
    store.save().unwrap();

    assert_eq!(second.calls(), 0);
    assert_eq!(summary.analyzed, 0);
    assert_eq!(summary.skipped, 3);
    assert_eq!(fs::read(&cache_path).unwrap(), saved);
}

#[test]
fn test_mtime_change_is_reanalyzed() {
    let dir = tempdir().unwrap();
    let files = write_library(dir.path(), 3);

    let mut store = CacheStore::in_memory();
    default_scheduler(2).run(dir.path(), &mut store).unwrap();

    set_file_mtime(&files[1], FileTime::from_unix_time(1_500_000_000, 0)).unwrap();

    let analyzer = Arc::new(CountingAnalyzer::default());
    let summary = scheduler(2, analyzer.clone())
        .run(dir.path(), &mut store)
        .unwrap();

    assert_eq!(analyzer.calls(), 1);
    assert_eq!(summary.analyzed, 1);
    assert_eq!(summary.skipped, 2);
    assert_eq!(store.len(), 3);

    let hash = Hasher::new().full_hash(&files[1]).unwrap();
    let record = store.get(&hash).unwrap();
    assert_eq!(record.modified_at, 1_500_000_000 * 1_000_000_000);
}

#[test]
fn test_failed_frequency_is_retried() {
    let dir = tempdir().unwrap();
    let files = write_library(dir.path(), 1);

    let mut store = CacheStore::in_memory();
    default_scheduler(1).run(dir.path(), &mut store).unwrap();

    // Mark the stored frequency as failed without touching the file.
    let hash = Hasher::new().full_hash(&files[0]).unwrap();
    let mut failed = store.get(&hash).unwrap().clone();
    failed.max_reliable_frequency_hz = Metric::Failed;
    store.upsert(hash.clone(), failed);

    let analyzer = Arc::new(CountingAnalyzer::default());
    let summary = scheduler(1, analyzer.clone())
        .run(dir.path(), &mut store)
        .unwrap();

    assert_eq!(analyzer.calls(), 1);
    assert_eq!(summary.analyzed, 1);
    assert!(store
        .get(&hash)
        .unwrap()
        .max_reliable_frequency_hz
        .value()
        .is_some());
}

#[test]
fn test_corrupt_file_among_valid_ones() {
    let dir = tempdir().unwrap();
    write_library(dir.path(), 10);
    write_corrupt(&dir.path().join("broken.flac"));

    let mut store = CacheStore::in_memory();
    let summary = default_scheduler(4).run(dir.path(), &mut store).unwrap();

    assert_eq!(summary.total, 11);
    assert_eq!(summary.analyzed, 11);
    assert_eq!(summary.partial_failures, 1);
    assert!(summary.has_issues());
    assert_eq!(store.len(), 11);

    let (broken, valid): (Vec<_>, Vec<_>) = store.records().partition(|r| r.has_failures());
    assert_eq!(valid.len(), 10);
    assert_eq!(broken.len(), 1);

    let broken = broken[0];
    assert_eq!(broken.file_name(), "broken.flac");
    assert_eq!(broken.max_reliable_frequency_hz, Metric::Failed);
    assert_eq!(broken.duration_seconds, Metric::Failed);
    assert!(broken.metadata_failed);

    // A failed record is retried on every run.
    let analyzer = Arc::new(CountingAnalyzer::default());
    scheduler(2, analyzer.clone())
        .run(dir.path(), &mut store)
        .unwrap();
    assert_eq!(analyzer.calls(), 1);
}

/// Analyzes one named file under an already expired deadline and every
/// other file normally.
struct DeadlineOn {
    name: &'static str,
    expired: AudioAnalyzer,
    normal: AudioAnalyzer,
}

impl DeadlineOn {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            expired: AudioAnalyzer::new(AnalyzerConfig {
                file_timeout: Some(Duration::from_nanos(1)),
                ..Default::default()
            }),
            normal: AudioAnalyzer::default(),
        }
    }
}

impl FileAnalyzer for DeadlineOn {
    fn analyze(&self, identity: &FileIdentity) -> Result<AnalysisRecord, Cancelled> {
        if identity.path.ends_with(self.name) {
            self.expired.analyze(identity)
        } else {
            self.normal.analyze(identity)
        }
    }
}

#[test]
fn test_timed_out_file_among_valid_ones() {
    let dir = tempdir().unwrap();
    write_library(dir.path(), 5);
    write_tone(&dir.path().join("long.wav"), 440.0, 3.0);

    let mut store = CacheStore::in_memory();
    let summary = scheduler(2, Arc::new(DeadlineOn::new("long.wav")))
        .run(dir.path(), &mut store)
        .unwrap();

    assert_eq!(summary.total, 6);
    assert_eq!(summary.analyzed, 6);
    assert_eq!(summary.partial_failures, 1);
    assert!(!summary.interrupted);

    let (timed_out, valid): (Vec<_>, Vec<_>) = store.records().partition(|r| r.has_failures());
    assert_eq!(valid.len(), 5);
    assert_eq!(timed_out.len(), 1);
    assert_eq!(timed_out[0].file_name(), "long.wav");
    assert_eq!(timed_out[0].max_reliable_frequency_hz, Metric::Failed);

    // Without the deadline only the timed-out file is analyzed again.
    let analyzer = Arc::new(CountingAnalyzer::default());
    scheduler(2, analyzer.clone())
        .run(dir.path(), &mut store)
        .unwrap();
    assert_eq!(analyzer.calls(), 1);
    assert!(store.records().all(|r| !r.has_failures()));
}

#[test]
fn test_results_independent_of_worker_count() {
    let dir = tempdir().unwrap();
    let files = write_library(dir.path(), 90);
    // Duplicate content under different names.
    for (i, source) in files.iter().take(10).enumerate() {
        fs::copy(source, dir.path().join(format!("copy_{i:02}.wav"))).unwrap();
    }

    let mut single = CacheStore::in_memory();
    let summary = default_scheduler(1).run(dir.path(), &mut single).unwrap();
    assert_eq!(summary.total, 100);

    let mut parallel = CacheStore::in_memory();
    default_scheduler(8).run(dir.path(), &mut parallel).unwrap();

    assert_eq!(single.len(), 90);
    assert_eq!(comparable(&single), comparable(&parallel));
}

#[test]
fn test_duplicate_content_attributed_to_smallest_path() {
    let dir = tempdir().unwrap();
    write_tone(&dir.path().join("b.wav"), 440.0, 0.2);
    fs::copy(dir.path().join("b.wav"), dir.path().join("a.wav")).unwrap();

    let mut store = CacheStore::in_memory();
    let summary = default_scheduler(4).run(dir.path(), &mut store).unwrap();

    assert_eq!(summary.analyzed, 2);
    assert_eq!(store.len(), 1);
    assert_eq!(store.records().next().unwrap().file_name(), "a.wav");
}

#[test]
fn test_invalid_roots() {
    let dir = tempdir().unwrap();
    let mut store = CacheStore::in_memory();

    let missing = dir.path().join("missing");
    let err = default_scheduler(1).run(&missing, &mut store).unwrap_err();
    assert!(matches!(err, BatchError::RootNotFound(_)));

    let file = dir.path().join("file.wav");
    write_tone(&file, 440.0, 0.1);
    let err = default_scheduler(1).run(&file, &mut store).unwrap_err();
    assert!(matches!(err, BatchError::NotADirectory(_)));
}
