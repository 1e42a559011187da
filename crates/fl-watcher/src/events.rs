//! Event types for file change notifications.
//!
//! # Event Flow
//!
//! ```text
//! File System Change
//!        │
//!        ▼
//! notify (create / modify)
//!        │
//!        ▼
//! content hash differs? ── no ──► dropped
//!        │ yes
//!        ▼
//! per-path debounce (1s) ── repeat ──► dropped
//!        │
//!        ▼
//!   ChangeEvent sent via channel
//!        │
//!        ▼
//!   DebouncedBatcher ──► ChangeBatch (sorted, deduplicated)
//! ```

use std::collections::BTreeSet;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};

/// A file whose content really changed.
///
/// Produced by the watcher after content hashing, consumed and discarded by
/// the batching layer.
///
/// # Examples
///
/// ```
/// use fl_watcher::ChangeEvent;
/// use camino::Utf8PathBuf;
///
/// let event = ChangeEvent::new(Utf8PathBuf::from("sketch/sketch.ino"));
/// assert_eq!(event.file_name(), Some("sketch.ino"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Absolute path of the file that changed.
    pub path: Utf8PathBuf,

    /// When the watcher accepted this change.
    pub timestamp: Instant,
}

impl ChangeEvent {
    /// Creates a new change event stamped with the current instant.
    #[inline]
    #[must_use]
    pub fn new(path: Utf8PathBuf) -> Self {
        Self {
            path,
            timestamp: Instant::now(),
        }
    }

    /// Creates a change event with a specific timestamp.
    #[inline]
    #[must_use]
    pub const fn with_timestamp(path: Utf8PathBuf, timestamp: Instant) -> Self {
        Self { path, timestamp }
    }

    /// Returns the file name without the directory path.
    #[inline]
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name()
    }
}

/// A flushed batch of changed paths.
///
/// Paths are sorted and deduplicated. A batch is produced once per quiet
/// period and never re-emitted.
///
/// # Examples
///
/// ```
/// use fl_watcher::ChangeBatch;
/// use camino::Utf8PathBuf;
///
/// let batch: ChangeBatch = ["b.ino", "a.h", "b.ino"]
///     .into_iter()
///     .map(Utf8PathBuf::from)
///     .collect();
///
/// assert_eq!(batch.len(), 2);
/// assert_eq!(batch.paths()[0].as_str(), "a.h");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    paths: Vec<Utf8PathBuf>,
}

impl ChangeBatch {
    /// Creates an empty batch.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { paths: Vec::new() }
    }

    /// Returns the sorted, deduplicated paths.
    #[inline]
    #[must_use]
    pub fn paths(&self) -> &[Utf8PathBuf] {
        &self.paths
    }

    /// Consumes the batch, returning its paths.
    #[inline]
    #[must_use]
    pub fn into_paths(self) -> Vec<Utf8PathBuf> {
        self.paths
    }

    /// Returns the number of distinct paths.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Returns `true` if nothing changed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Returns `true` if the batch contains `path`.
    #[must_use]
    pub fn contains(&self, path: &Utf8Path) -> bool {
        self.paths
            .binary_search_by(|p| p.as_path().cmp(path))
            .is_ok()
    }

    /// Returns an iterator over the paths.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Utf8PathBuf> {
        self.paths.iter()
    }
}

impl From<BTreeSet<Utf8PathBuf>> for ChangeBatch {
    fn from(paths: BTreeSet<Utf8PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }
}

impl FromIterator<Utf8PathBuf> for ChangeBatch {
    fn from_iter<T: IntoIterator<Item = Utf8PathBuf>>(iter: T) -> Self {
        iter.into_iter().collect::<BTreeSet<_>>().into()
    }
}

impl IntoIterator for ChangeBatch {
    type Item = Utf8PathBuf;
    type IntoIter = std::vec::IntoIter<Utf8PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.into_iter()
    }
}

impl<'a> IntoIterator for &'a ChangeBatch {
    type Item = &'a Utf8PathBuf;
    type IntoIter = std::slice::Iter<'a, Utf8PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.iter()
    }
}
