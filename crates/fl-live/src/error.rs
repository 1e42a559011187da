//! Error types for the rebuild loop.
//!
//! This module provides the [`LiveError`] type. Most faults inside the loop
//! are local to one compile or one subsystem and are logged rather than
//! returned; the variants here are what escapes to the caller.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors raised by the rebuild loop and its adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LiveError {
    /// The owned local compile server stopped running.
    #[error("compile server at {url} is no longer running")]
    ServerDied {
        /// URL the server was serving.
        url: String,
    },

    /// The local compile server could not be started.
    #[error("failed to start compile server: {0}")]
    ServerStart(String),

    /// The compile backend could not be invoked at all.
    #[error("compile backend error: {0}")]
    Backend(String),

    /// The preview server could not be started.
    #[error("preview server error: {0}")]
    Preview(String),

    /// A build archive contained an entry that would land outside the
    /// serving directory.
    #[error("archive entry escapes the output directory: {0}")]
    UnsafeArchiveEntry(String),

    /// A directory required by the loop does not exist.
    #[error("directory does not exist: {0}")]
    MissingDirectory(Utf8PathBuf),

    /// A build archive could not be read or written.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// File watcher failure.
    #[error("watcher error: {0}")]
    Watch(#[from] fl_watcher::WatchError),

    /// Backend probing failure.
    #[error("probe error: {0}")]
    Probe(#[from] fl_probe::ProbeError),

    /// A configuration value the loop cannot run with.
    #[error("configuration error: {0}")]
    Config(#[from] fl_core::ConfigError),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LiveError {
    /// Creates a new [`LiveError::Backend`] error.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Creates a new [`LiveError::Preview`] error.
    #[must_use]
    pub fn preview(message: impl Into<String>) -> Self {
        Self::Preview(message.into())
    }

    /// Creates a new [`LiveError::ServerStart`] error.
    #[must_use]
    pub fn server_start(message: impl Into<String>) -> Self {
        Self::ServerStart(message.into())
    }

    /// Returns `true` if the loop can keep going after this error.
    ///
    /// A failed compile or publish only affects that one iteration. A dead
    /// server, a broken watcher or prober, or bad configuration ends the
    /// session.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Backend(_)
                | Self::Preview(_)
                | Self::UnsafeArchiveEntry(_)
                | Self::MissingDirectory(_)
                | Self::Archive(_)
                | Self::Io(_)
        )
    }

    /// Returns `true` if the session must end.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }
}
