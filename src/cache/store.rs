//! JSON-backed analysis cache.
//!
//! The store is a map from content hash to [`AnalysisRecord`]. It is loaded
//! once at the start of a run, mutated only by the batch aggregator, and
//! written once at the end via a temporary file and an atomic rename so an
//! interrupted write never truncates the previous cache.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use thiserror::Error;

use super::entry::AnalysisRecord;
use crate::scanner::FileIdentity;

/// File name of the cache inside the platform cache directory.
pub const CACHE_FILE_NAME: &str = "analysis_cache.json";

/// Errors that can occur while loading or persisting the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache file exists but could not be read.
    #[error("Failed to read cache file {path}: {source}")]
    Read {
        /// Cache file path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The cache could not be written.
    #[error("Failed to write cache file {path}: {source}")]
    Write {
        /// Cache file path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The cache could not be serialized.
    #[error("Failed to serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),

    /// No platform cache directory could be determined.
    #[error("Failed to determine a cache directory for this platform")]
    NoCacheDir,
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Persistent mapping from content hash to analysis record.
#[derive(Debug, Clone, Default)]
pub struct CacheStore {
    path: Option<PathBuf>,
    records: BTreeMap<String, AnalysisRecord>,
    dirty: bool,
}

impl CacheStore {
    /// A store with no backing file; [`CacheStore::save`] is a no-op.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the cache at `path`.
    ///
    /// A missing file yields an empty store. A file that cannot be parsed is
    /// moved aside to `<name>.corrupt` and an empty store is returned, so a
    /// damaged cache costs a full re-analysis rather than the run.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Read`] if the file exists but cannot be read.
    pub fn open(path: &Path) -> CacheResult<Self> {
        let mut store = Self {
            path: Some(path.to_path_buf()),
            ..Self::default()
        };

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("No cache at {}, starting empty", path.display());
                return Ok(store);
            }
            Err(source) => {
                return Err(CacheError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        match serde_json::from_str::<BTreeMap<String, AnalysisRecord>>(&content) {
            Ok(records) => {
                log::debug!(
                    "Loaded {} cached records from {}",
                    records.len(),
                    path.display()
                );
                store.records = records;
            }
            Err(e) => {
                let backup = corrupt_backup_path(path);
                log::error!(
                    "Cache file {} is corrupt ({}); moving it to {} and starting empty",
                    path.display(),
                    e,
                    backup.display()
                );
                if let Err(e) = fs::rename(path, &backup) {
                    log::warn!("Failed to back up corrupt cache: {}", e);
                }
                store.dirty = true;
            }
        }

        Ok(store)
    }

    /// Platform-specific default cache path.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NoCacheDir`] if no home directory can be found.
    pub fn default_path() -> CacheResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "hifirate", "hifirate").ok_or(CacheError::NoCacheDir)?;
        Ok(dirs.cache_dir().join(CACHE_FILE_NAME))
    }

    /// Backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Look up the record for a content hash.
    #[must_use]
    pub fn get(&self, content_hash: &str) -> Option<&AnalysisRecord> {
        self.records.get(content_hash)
    }

    /// Whether the file described by `identity` must be (re)analyzed.
    #[must_use]
    pub fn is_stale(&self, identity: &FileIdentity) -> bool {
        self.records
            .get(&identity.content_hash)
            .map_or(true, |record| record.is_stale_for(identity))
    }

    /// Insert or replace the record for a content hash, returning the old one.
    pub fn upsert(
        &mut self,
        content_hash: String,
        record: AnalysisRecord,
    ) -> Option<AnalysisRecord> {
        self.dirty = true;
        self.records.insert(content_hash, record)
    }

    /// Remove every record.
    pub fn clear(&mut self) {
        if !self.records.is_empty() {
            self.dirty = true;
        }
        self.records.clear();
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether the store changed since it was loaded or last saved.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// All records in content-hash order.
    pub fn records(&self) -> impl Iterator<Item = &AnalysisRecord> {
        self.records.values()
    }

    /// All `(content_hash, record)` pairs in content-hash order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AnalysisRecord)> {
        self.records.iter()
    }

    /// Read-only freshness view handed to worker threads.
    #[must_use]
    pub fn staleness_index(&self) -> StalenessIndex {
        StalenessIndex {
            entries: self
                .records
                .iter()
                .map(|(hash, record)| {
                    (
                        hash.clone(),
                        Freshness {
                            size_bytes: record.size_bytes,
                            modified_at: record.modified_at,
                            must_retry: record.has_failures(),
                        },
                    )
                })
                .collect(),
        }
    }

    /// Serialize the store to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Serialize`] if a record cannot be serialized.
    pub fn to_json(&self) -> CacheResult<String> {
        Ok(serde_json::to_string_pretty(&self.records)?)
    }

    /// Persist the store atomically: write a sibling temporary file, flush it
    /// to disk, then rename it over the cache file.
    ///
    /// Does nothing for an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Write`] if any filesystem step fails.
    pub fn save(&mut self) -> CacheResult<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };

        let write_err = |source: std::io::Error| CacheError::Write {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let json = self.to_json()?;
        let tmp_path = temp_path(&path);
        {
            let file = File::create(&tmp_path).map_err(write_err)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(json.as_bytes()).map_err(write_err)?;
            let file = writer.into_inner().map_err(|e| write_err(e.into_error()))?;
            file.sync_all().map_err(write_err)?;
        }

        if let Err(e) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(write_err(e));
        }

        log::info!(
            "Saved {} cached records to {}",
            self.records.len(),
            path.display()
        );
        self.dirty = false;
        Ok(())
    }
}

/// Stored freshness signals for one content hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Freshness {
    size_bytes: u64,
    modified_at: u64,
    must_retry: bool,
}

/// Immutable snapshot of the cache's freshness signals.
///
/// Workers consult this instead of the store itself, so the store has a single
/// owner for the whole run.
#[derive(Debug, Clone, Default)]
pub struct StalenessIndex {
    entries: HashMap<String, Freshness>,
}

impl StalenessIndex {
    /// Same verdict as [`CacheStore::is_stale`] at the time of the snapshot.
    #[must_use]
    pub fn is_stale(&self, identity: &FileIdentity) -> bool {
        self.entries
            .get(&identity.content_hash)
            .map_or(true, |f| {
                f.must_retry
                    || f.size_bytes != identity.size_bytes
                    || f.modified_at != identity.modified_at
            })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| CACHE_FILE_NAME.into(), |n| n.to_string_lossy());
    path.with_file_name(format!(".{name}.tmp"))
}

fn corrupt_backup_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| CACHE_FILE_NAME.into(), |n| n.to_string_lossy());
    path.with_file_name(format!("{name}.corrupt"))
}
