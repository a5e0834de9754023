//! BLAKE3 file hasher with streaming support.
//!
//! # Overview
//! This module provides the [`Hasher`] struct, which resolves a path into a
//! [`FileIdentity`]: size and modification time from a stat call, and a
//! content digest computed by streaming the file in fixed-size blocks.
//! The digest depends only on the bytes, never on the block size.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use super::{unix_nanos, FileIdentity, HashError};

/// Default read block size (64 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Streaming content hasher.
#[derive(Debug, Clone)]
pub struct Hasher {
    buffer_size: usize,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// Create a hasher with the default block size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Create a hasher reading `buffer_size` bytes per block (minimum 1).
    #[must_use]
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }

    /// Block size used for streaming reads.
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Hash the full content of a file, returning the lowercase hex digest.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or read.
    pub fn full_hash(&self, path: &Path) -> Result<String, HashError> {
        let mut file = File::open(path).map_err(|e| map_io_error(path, e))?;
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; self.buffer_size];

        loop {
            let read = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(map_io_error(path, e)),
            };
            hasher.update(&buffer[..read]);
        }

        Ok(hasher.finalize().to_hex().to_string())
    }

    /// Resolve the identity of a file: size, modification time and content hash.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be stat'ed, opened or read.
    pub fn identify(&self, path: &Path) -> Result<FileIdentity, HashError> {
        let metadata = std::fs::metadata(path).map_err(|e| map_io_error(path, e))?;
        let modified = metadata.modified().map_err(|e| map_io_error(path, e))?;
        let content_hash = self.full_hash(path)?;

        log::trace!("Identified {} as {}", path.display(), content_hash);

        Ok(FileIdentity {
            path: path.to_path_buf(),
            size_bytes: metadata.len(),
            modified_at: unix_nanos(modified),
            content_hash,
        })
    }
}

fn map_io_error(path: &Path, error: std::io::Error) -> HashError {
    match error.kind() {
        ErrorKind::NotFound => HashError::NotFound(path.to_path_buf()),
        ErrorKind::PermissionDenied => HashError::PermissionDenied(path.to_path_buf()),
        _ => HashError::Io {
            path: path.to_path_buf(),
            source: error,
        },
    }
}
