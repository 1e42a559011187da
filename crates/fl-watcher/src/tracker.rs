//! Content-hash change detection.
//!
//! [`ChangeTracker`] owns the path → content-hash record for one watched
//! tree. It decides whether a raw filesystem event is a real content change
//! and applies the per-path courtesy debounce before a change is emitted.
//!
//! The tracker is plain synchronous state with a single writer (the
//! watcher's consuming thread); it does no I/O besides reading the file
//! being hashed.

use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use fl_core::{FxHashMap, SharedClock, content_digest, fx_hash_map};

use crate::filter::FileFilter;

/// Tracks the last-seen content hash of every modified file under a root.
pub struct ChangeTracker {
    root: Utf8PathBuf,
    filter: Box<dyn FileFilter>,
    hashes: FxHashMap<Utf8PathBuf, u64>,
    last_emitted: FxHashMap<Utf8PathBuf, Instant>,
    path_debounce: Duration,
    clock: SharedClock,
}

impl std::fmt::Debug for ChangeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeTracker")
            .field("root", &self.root)
            .field("tracked", &self.hashes.len())
            .field("path_debounce", &self.path_debounce)
            .finish_non_exhaustive()
    }
}

impl ChangeTracker {
    /// Creates a tracker for files under `root`.
    pub fn new<F: FileFilter>(
        root: impl Into<Utf8PathBuf>,
        filter: F,
        path_debounce: Duration,
        clock: SharedClock,
    ) -> Self {
        Self {
            root: root.into(),
            filter: Box::new(filter),
            hashes: fx_hash_map(),
            last_emitted: fx_hash_map(),
            path_debounce,
            clock,
        }
    }

    /// Records a modification of `path`.
    ///
    /// Returns `true` only when the file's content differs from the last
    /// recorded content (or was never recorded). Directories, filtered paths
    /// and unreadable files return `false`; an unreadable file leaves the
    /// record untouched, so a later readable version that differs still
    /// counts.
    pub fn observe(&mut self, path: &Utf8Path) -> bool {
        if path.is_dir() {
            return false;
        }

        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        if !self.filter.should_process(relative) {
            tracing::trace!(path = %relative, "Filtered out file event");
            return false;
        }

        let digest = match std::fs::read(path) {
            Ok(bytes) => content_digest(&bytes),
            Err(error) => {
                tracing::debug!(path = %path, error = %error, "Could not hash changed file");
                return false;
            }
        };

        match self.hashes.insert(path.to_owned(), digest) {
            Some(previous) if previous == digest => {
                tracing::trace!(path = %relative, "Content unchanged");
                false
            }
            _ => true,
        }
    }

    /// Applies the per-path debounce to a confirmed change.
    ///
    /// Returns `false` if `path` was already emitted within the debounce
    /// interval. Only admitted changes restart the interval.
    pub fn admit(&mut self, path: &Utf8Path) -> bool {
        let now = self.clock.now();
        if let Some(last) = self.last_emitted.get(path) {
            if now.saturating_duration_since(*last) < self.path_debounce {
                tracing::trace!(path = %path, "Dropped repeat within per-path debounce");
                return false;
            }
        }
        self.last_emitted.insert(path.to_owned(), now);
        true
    }

    /// Returns the watched root.
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns the number of files with a recorded hash.
    #[inline]
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.hashes.len()
    }
}
