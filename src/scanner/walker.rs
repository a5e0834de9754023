//! Directory walker implementation using jwalk for parallel traversal.
//!
//! # Overview
//!
//! This module provides the [`Walker`] struct for traversing a music library
//! and collecting candidate audio files. It uses [`jwalk`] for parallel
//! directory reading.
//!
//! # Features
//!
//! - Parallel directory traversal using rayon thread pool
//! - Case-insensitive audio extension filtering
//! - Gitignore-style pattern matching via the `ignore` crate
//! - Minimum size filtering for placeholder files
//! - Hidden file filtering
//! - Graceful shutdown via atomic flag
//!
//! # Example
//!
//! ```no_run
//! use hifirate::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/home/user/Music"), WalkerConfig::default());
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(file) => println!("{}: {} bytes", file.path.display(), file.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use jwalk::WalkDir;

use super::{AudioExtension, FileEntry, ScanError, WalkerConfig};

/// Directory walker for parallel candidate discovery.
#[derive(Debug)]
pub struct Walker {
    /// Root path to walk
    root: PathBuf,
    /// Walker configuration
    config: WalkerConfig,
    /// Optional shutdown flag for graceful termination
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a new walker for the given path.
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        Self {
            root: path.to_path_buf(),
            config,
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag for graceful termination.
    ///
    /// When the flag is set to `true`, the walker stops yielding entries.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Build gitignore matcher from config patterns.
    fn build_gitignore(&self) -> Option<Gitignore> {
        if self.config.ignore_patterns.is_empty() {
            return None;
        }

        let mut builder = GitignoreBuilder::new(&self.root);
        for pattern in &self.config.ignore_patterns {
            if let Err(e) = builder.add_line(None, pattern) {
                log::warn!("Invalid ignore pattern '{}': {}", pattern, e);
            }
        }

        match builder.build() {
            Ok(gitignore) if gitignore.is_empty() => None,
            Ok(gitignore) => Some(gitignore),
            Err(e) => {
                log::warn!("Failed to build ignore patterns: {}", e);
                None
            }
        }
    }

    fn should_ignore(&self, path: &Path, is_dir: bool, gitignore: &Option<Gitignore>) -> bool {
        let Some(gi) = gitignore else {
            return false;
        };
        let relative_path = path.strip_prefix(&self.root).unwrap_or(path);
        gi.matched_path_or_any_parents(relative_path, is_dir)
            .is_ignore()
    }

    fn passes_size_filter(&self, size: u64) -> bool {
        self.config.min_size.map_or(true, |min| size >= min)
    }

    fn passes_extension_filter(&self, path: &Path) -> bool {
        AudioExtension::of_path(path).is_some_and(|ext| self.config.accepts(ext))
    }

    /// Walk the directory tree, yielding candidate audio files.
    ///
    /// Errors are yielded as [`ScanError`] values rather than stopping
    /// iteration. Children are visited in file-name order so repeated walks
    /// of an unchanged tree yield the same sequence.
    pub fn walk(&self) -> impl Iterator<Item = Result<FileEntry, ScanError>> + '_ {
        let gitignore = self.build_gitignore();

        let walk_dir = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .skip_hidden(self.config.skip_hidden)
            .process_read_dir(move |_depth, _path, _read_dir_state, children| {
                children.sort_by(|a, b| match (a, b) {
                    (Ok(a), Ok(b)) => a.file_name().cmp(b.file_name()),
                    (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                    (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                    (Err(_), Err(_)) => std::cmp::Ordering::Equal,
                });
            });

        walk_dir.into_iter().filter_map(move |entry_result| {
            if self.is_shutdown_requested() {
                log::debug!("Walker: Shutdown requested, stopping iteration");
                return None;
            }

            match entry_result {
                Ok(entry) => {
                    let path = entry.path();
                    if path == self.root {
                        return None;
                    }

                    let file_type = entry.file_type();
                    if file_type.is_dir() {
                        return None;
                    }

                    if !self.passes_extension_filter(&path) {
                        return None;
                    }

                    if self.should_ignore(&path, false, &gitignore) {
                        log::trace!("Ignoring file: {}", path.display());
                        return None;
                    }

                    if file_type.is_symlink() && !self.config.follow_symlinks {
                        log::trace!("Skipping symlink: {}", path.display());
                        return None;
                    }

                    let metadata = if self.config.follow_symlinks {
                        std::fs::metadata(&path)
                    } else {
                        std::fs::symlink_metadata(&path)
                    };

                    match metadata {
                        Ok(m) if m.is_file() => self.process_file_entry(path, &m),
                        Ok(_) => None,
                        Err(e) => Some(self.handle_io_error(&path, e)),
                    }
                }
                Err(e) => {
                    let path = e
                        .path()
                        .map_or_else(|| self.root.clone(), std::borrow::ToOwned::to_owned);
                    log::warn!("Walker error for {}: {}", path.display(), e);
                    Some(Err(ScanError::Io {
                        path,
                        source: std::io::Error::other(e.to_string()),
                    }))
                }
            }
        })
    }

    fn process_file_entry(
        &self,
        path: PathBuf,
        metadata: &Metadata,
    ) -> Option<Result<FileEntry, ScanError>> {
        let size = metadata.len();

        if !self.passes_size_filter(size) {
            log::debug!(
                "Skipping file below minimum size ({} bytes): {}",
                size,
                path.display()
            );
            return None;
        }

        Some(Ok(FileEntry::new(path, size)))
    }

    fn handle_io_error(&self, path: &Path, error: std::io::Error) -> Result<FileEntry, ScanError> {
        use std::io::ErrorKind;

        match error.kind() {
            ErrorKind::PermissionDenied => {
                log::warn!("Permission denied: {}", path.display());
                Err(ScanError::PermissionDenied(path.to_path_buf()))
            }
            ErrorKind::NotFound => {
                log::debug!("File not found (may have been deleted): {}", path.display());
                Err(ScanError::NotFound(path.to_path_buf()))
            }
            _ => {
                log::warn!("I/O error for {}: {}", path.display(), error);
                Err(ScanError::Io {
                    path: path.to_path_buf(),
                    source: error,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(path: &Path, len: usize) {
        let mut f = File::create(path).unwrap();
        f.write_all(&vec![0x55u8; len]).unwrap();
    }

    /// Library layout: two audio files at the top, one nested, plus noise.
    fn create_library() -> TempDir {
        let dir = TempDir::new().unwrap();
        write_file(&dir.path().join("a.flac"), 2048);
        write_file(&dir.path().join("B.MP3"), 2048);
        write_file(&dir.path().join("cover.jpg"), 2048);
        write_file(&dir.path().join("notes.txt"), 2048);

        let album = dir.path().join("album");
        fs::create_dir(&album).unwrap();
        write_file(&album.join("01.wav"), 4096);
        write_file(&album.join("02.aif"), 4096);
        dir
    }

    fn names(walker: &Walker) -> Vec<String> {
        let mut names: Vec<String> = walker
            .walk()
            .filter_map(Result::ok)
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_walker_finds_audio_files_recursively() {
        let dir = create_library();
        let walker = Walker::new(dir.path(), WalkerConfig::default());

        assert_eq!(names(&walker), vec!["01.wav", "02.aif", "B.MP3", "a.flac"]);
    }

    #[test]
    fn test_walker_extension_subset() {
        let dir = create_library();
        let config = WalkerConfig::default()
            .with_extensions(vec![AudioExtension::Mp3, AudioExtension::Wav]);
        let walker = Walker::new(dir.path(), config);

        assert_eq!(names(&walker), vec!["01.wav", "B.MP3"]);
    }

    #[test]
    fn test_walker_min_size_filter() {
        let dir = create_library();
        write_file(&dir.path().join("stub.flac"), 10);

        let config = WalkerConfig::default().with_min_size(Some(1024));
        let walker = Walker::new(dir.path(), config);

        let found = names(&walker);
        assert!(!found.contains(&"stub.flac".to_string()));
        assert_eq!(found.len(), 4);
    }

    #[test]
    fn test_walker_skip_hidden_files() {
        let dir = create_library();
        write_file(&dir.path().join(".hidden.flac"), 2048);

        let config = WalkerConfig {
            skip_hidden: true,
            ..Default::default()
        };
        let walker = Walker::new(dir.path(), config);

        assert!(!names(&walker).iter().any(|n| n.starts_with('.')));
    }

    #[test]
    fn test_walker_ignore_patterns() {
        let dir = create_library();
        let config = WalkerConfig {
            ignore_patterns: vec!["album/".to_string()],
            ..Default::default()
        };
        let walker = Walker::new(dir.path(), config);

        assert_eq!(names(&walker), vec!["B.MP3", "a.flac"]);
    }

    #[test]
    fn test_walker_shutdown_flag() {
        let dir = create_library();
        let shutdown = Arc::new(AtomicBool::new(true));
        let walker =
            Walker::new(dir.path(), WalkerConfig::default()).with_shutdown_flag(shutdown);

        assert!(walker.walk().filter_map(Result::ok).count() < 2);
    }

    #[test]
    fn test_walker_handles_nonexistent_path() {
        let walker = Walker::new(
            Path::new("/nonexistent/path/12345"),
            WalkerConfig::default(),
        );

        let results: Vec<_> = walker.walk().collect();
        assert!(results.is_empty() || results.iter().all(|r| r.is_err()));
    }
}
