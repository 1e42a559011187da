//! Error types for the fl-watcher crate.
//!
//! This module provides the [`WatchError`] type for errors that can occur
//! while starting, running, or stopping a watcher.

use camino::Utf8PathBuf;

/// Errors that can occur during file watching operations.
///
/// Per-file problems (unreadable files, paths that are not UTF-8) never
/// surface as errors from a running watcher. They are logged and degrade to
/// "no change this tick". The variants here cover startup and lifecycle.
///
/// Every variant is fatal to the watcher that raised it.
///
/// # Examples
///
/// ```
/// use fl_watcher::WatchError;
///
/// let err = WatchError::path_not_found("sketch/missing");
/// assert_eq!(err.to_string(), "path does not exist: sketch/missing");
/// ```
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Failed to initialize or operate the notify watcher.
    #[error("notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// The specified path does not exist.
    #[error("path does not exist: {0}")]
    PathNotFound(Utf8PathBuf),

    /// The blocking watcher worker panicked or was cancelled.
    #[error("watcher worker failed: {0}")]
    WorkerFailed(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatchError {
    /// Creates a new [`WatchError::PathNotFound`] error.
    #[inline]
    pub fn path_not_found(path: impl Into<Utf8PathBuf>) -> Self {
        Self::PathNotFound(path.into())
    }

    /// Returns the file path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::PathNotFound(path) => Some(path),
            Self::Notify(_) | Self::WorkerFailed(_) | Self::Io(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_watch_error_path_not_found() {
        let err = WatchError::path_not_found("sketch/missing");
        assert_eq!(err.path().map(|p| p.as_str()), Some("sketch/missing"));
        assert_eq!(err.to_string(), "path does not exist: sketch/missing");
    }

    #[test]
    fn test_watch_error_worker_failed() {
        let err = WatchError::WorkerFailed("task panicked".to_owned());
        assert!(err.path().is_none());
        assert!(err.to_string().contains("task panicked"));
    }

    #[test]
    fn test_watch_error_io() {
        let err = WatchError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert!(err.to_string().contains("I/O error"));
    }
}
