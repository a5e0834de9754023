use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hifirate::analysis::{AnalyzerConfig, AudioAnalyzer, Cancelled, FileAnalyzer};
use hifirate::batch::{BatchConfig, BatchScheduler};
use hifirate::cache::{AnalysisRecord, CacheStore};
use hifirate::scanner::FileIdentity;

pub const SAMPLE_RATE: u32 = 22_050;

/// Write a mono 16-bit WAV holding a sine at `freq` Hz.
pub fn write_tone(path: &Path, freq: f64, seconds: f64) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let len = (f64::from(SAMPLE_RATE) * seconds) as usize;
    for n in 0..len {
        let t = n as f64 / f64::from(SAMPLE_RATE);
        let sample = 0.5 * (2.0 * PI * freq * t).sin();
        writer
            .write_sample((sample * f64::from(i16::MAX)) as i16)
            .unwrap();
    }
    writer.finalize().unwrap();
}

/// Write `count` distinct short tones named `track_000.wav`, `track_001.wav`, ...
pub fn write_library(root: &Path, count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let path = root.join(format!("track_{i:03}.wav"));
            write_tone(&path, 200.0 + 37.0 * i as f64, 0.2);
            path
        })
        .collect()
}

/// A file with an audio extension that no demuxer accepts.
pub fn write_corrupt(path: &Path) {
    let garbage: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 251) as u8).collect();
    fs::write(path, garbage).unwrap();
}

/// Production analyzer that counts how many files it was asked to analyze.
#[derive(Default)]
pub struct CountingAnalyzer {
    inner: AudioAnalyzer,
    calls: AtomicUsize,
}

impl CountingAnalyzer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FileAnalyzer for CountingAnalyzer {
    fn analyze(&self, identity: &FileIdentity) -> Result<AnalysisRecord, Cancelled> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.analyze(identity)
    }
}

pub fn scheduler(workers: usize, analyzer: Arc<dyn FileAnalyzer>) -> BatchScheduler {
    BatchScheduler::new(BatchConfig::default().with_workers(workers), analyzer)
}

pub fn default_scheduler(workers: usize) -> BatchScheduler {
    scheduler(
        workers,
        Arc::new(AudioAnalyzer::new(AnalyzerConfig::default())),
    )
}

/// Records keyed by hash with the analysis timestamp removed.
pub fn comparable(store: &CacheStore) -> BTreeMap<String, AnalysisRecord> {
    store
        .iter()
        .map(|(hash, record)| {
            let mut record = record.clone();
            record.analyzed_at = None;
            (hash.clone(), record)
        })
        .collect()
}
