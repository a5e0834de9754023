//! Scanner module for candidate discovery and file identity.
//!
//! This module provides functionality for:
//! - Parallel directory walking using jwalk, filtered to audio extensions
//! - Content hashing with BLAKE3 to build a [`FileIdentity`]
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Directory traversal and candidate discovery
//! - [`hasher`]: Streaming BLAKE3 hashing and identity resolution
//!
//! # Example
//!
//! ```no_run
//! use hifirate::scanner::{AudioExtension, Hasher, Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let config = WalkerConfig {
//!     extensions: vec![AudioExtension::Flac, AudioExtension::Mp3],
//!     min_size: Some(1024),
//!     ..Default::default()
//! };
//!
//! let hasher = Hasher::new();
//! let walker = Walker::new(Path::new("."), config);
//! for entry in walker.walk() {
//!     match entry.map(|file| hasher.identify(&file.path)) {
//!         Ok(Ok(identity)) => println!("{} {}", identity.content_hash, identity.path.display()),
//!         Ok(Err(e)) => eprintln!("Warning: {}", e),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

pub mod hasher;
pub mod walker;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub use hasher::{Hasher, DEFAULT_BUFFER_SIZE};
pub use walker::Walker;

/// Default minimum size for a candidate file. Smaller files are treated as
/// placeholders or truncated downloads.
pub const DEFAULT_MIN_SIZE: u64 = 1024;

/// Audio container extensions accepted by the batch scanner.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AudioExtension {
    /// Free Lossless Audio Codec
    Flac,
    /// Audio Interchange File Format
    Aiff,
    /// Audio Interchange File Format (short form)
    Aif,
    /// MPEG-4 audio (AAC or ALAC)
    M4a,
    /// MPEG-1/2 Layer III
    Mp3,
    /// RIFF WAVE
    Wav,
}

impl AudioExtension {
    /// Every accepted extension, in display order.
    pub const ALL: [AudioExtension; 6] = [
        AudioExtension::Flac,
        AudioExtension::Aiff,
        AudioExtension::Aif,
        AudioExtension::M4a,
        AudioExtension::Mp3,
        AudioExtension::Wav,
    ];

    /// The lowercase extension without the leading dot.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flac => "flac",
            Self::Aiff => "aiff",
            Self::Aif => "aif",
            Self::M4a => "m4a",
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
        }
    }

    /// Parse an extension case-insensitively, with or without a leading dot.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.');
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str().eq_ignore_ascii_case(ext))
    }

    /// Extension of `path`, if it is one of the accepted audio extensions.
    #[must_use]
    pub fn of_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for AudioExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".{}", self.as_str())
    }
}

/// Metadata for a discovered candidate file.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
}

impl FileEntry {
    /// Create a new FileEntry.
    #[must_use]
    pub fn new(path: PathBuf, size: u64) -> Self {
        Self { path, size }
    }
}

/// Identity of a file's content plus the freshness signals observed with it.
///
/// `content_hash` is the cache key: two files with identical bytes share one
/// identity key regardless of path. `path`, `size_bytes` and `modified_at` only
/// decide whether a stored record is still fresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIdentity {
    /// Path the content was observed at
    pub path: PathBuf,
    /// File size in bytes
    pub size_bytes: u64,
    /// Modification time, nanoseconds since the Unix epoch
    pub modified_at: u64,
    /// Lowercase hex BLAKE3 digest of the full file content
    pub content_hash: String,
}

/// Convert a timestamp to whole nanoseconds since the Unix epoch.
///
/// Times before the epoch clamp to zero; times past year 2554 saturate.
#[must_use]
pub fn unix_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Configuration for directory walking.
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Accepted extensions (case-insensitive). Empty accepts every accepted
    /// audio extension.
    pub extensions: Vec<AudioExtension>,

    /// Follow symbolic links during traversal.
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (names starting with `.`).
    pub skip_hidden: bool,

    /// Minimum file size to include (in bytes).
    pub min_size: Option<u64>,

    /// Glob patterns to ignore (gitignore-style).
    pub ignore_patterns: Vec<String>,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            extensions: AudioExtension::ALL.to_vec(),
            follow_symlinks: false,
            skip_hidden: false,
            min_size: None,
            ignore_patterns: Vec::new(),
        }
    }
}

impl WalkerConfig {
    /// Restrict the walk to the given extensions.
    #[must_use]
    pub fn with_extensions(mut self, extensions: Vec<AudioExtension>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Set the minimum file size filter.
    #[must_use]
    pub fn with_min_size(mut self, min_size: Option<u64>) -> Self {
        self.min_size = min_size;
        self
    }

    /// Whether `ext` is accepted by this configuration.
    #[must_use]
    pub fn accepts(&self, ext: AudioExtension) -> bool {
        self.extensions.is_empty() || self.extensions.contains(&ext)
    }
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur while resolving a file's identity.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl HashError {
    /// Path of the file that could not be resolved.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(path) | Self::PermissionDenied(path) => path,
            Self::Io { path, .. } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_file_entry_new() {
        let entry = FileEntry::new(PathBuf::from("/music/a.flac"), 1024);

        assert_eq!(entry.path, PathBuf::from("/music/a.flac"));
        assert_eq!(entry.size, 1024);
    }

    #[test]
    fn test_extension_parsing_is_case_insensitive() {
        assert_eq!(
            AudioExtension::from_extension("FLAC"),
            Some(AudioExtension::Flac)
        );
        assert_eq!(
            AudioExtension::from_extension(".Mp3"),
            Some(AudioExtension::Mp3)
        );
        assert_eq!(AudioExtension::from_extension("ogg"), None);
        assert_eq!(
            AudioExtension::of_path(Path::new("/x/Track 01.AIF")),
            Some(AudioExtension::Aif)
        );
        assert_eq!(AudioExtension::of_path(Path::new("/x/noext")), None);
    }

    #[test]
    fn test_extension_display() {
        assert_eq!(AudioExtension::M4a.to_string(), ".m4a");
    }

    #[test]
    fn test_walker_config_default_accepts_all() {
        let config = WalkerConfig::default();

        assert!(!config.follow_symlinks);
        assert!(!config.skip_hidden);
        assert!(config.min_size.is_none());
        for ext in AudioExtension::ALL {
            assert!(config.accepts(ext));
        }
    }

    #[test]
    fn test_walker_config_subset() {
        let config = WalkerConfig::default().with_extensions(vec![AudioExtension::Wav]);
        assert!(config.accepts(AudioExtension::Wav));
        assert!(!config.accepts(AudioExtension::Mp3));
    }

    #[test]
    fn test_unix_nanos() {
        assert_eq!(unix_nanos(UNIX_EPOCH), 0);
        assert_eq!(unix_nanos(UNIX_EPOCH + Duration::new(2, 5)), 2_000_000_005);
        assert_eq!(unix_nanos(UNIX_EPOCH - Duration::from_secs(10)), 0);
    }

    #[test]
    fn test_scan_error_display() {
        let err = ScanError::PermissionDenied(PathBuf::from("/test"));
        assert_eq!(err.to_string(), "Permission denied: /test");

        let err = ScanError::NotADirectory(PathBuf::from("/file.wav"));
        assert_eq!(err.to_string(), "Not a directory: /file.wav");
    }

    #[test]
    fn test_hash_error_path() {
        let err = HashError::NotFound(PathBuf::from("/gone.flac"));
        assert_eq!(err.to_string(), "File not found: /gone.flac");
        assert_eq!(err.path(), Path::new("/gone.flac"));
    }
}
