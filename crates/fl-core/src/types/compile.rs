//! Compile results.

use crate::hash::ContentHash;

/// The outcome of one compile call against a backend.
///
/// `archive_bytes` is a zip archive whose entries are the files to publish,
/// relative to the serving directory. It is empty for failed compiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileResult {
    /// Whether the backend produced usable output.
    pub success: bool,

    /// Compiler output, shown to the user on success and failure alike.
    pub stdout: String,

    /// Hash of the produced output, if the backend reported one.
    pub content_hash: Option<ContentHash>,

    /// Zip archive of the produced output.
    pub archive_bytes: Vec<u8>,
}

impl CompileResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(
        stdout: impl Into<String>,
        content_hash: Option<ContentHash>,
        archive_bytes: Vec<u8>,
    ) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            content_hash,
            archive_bytes,
        }
    }

    /// Creates a failed result carrying the compiler output.
    #[must_use]
    pub fn failure(stdout: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: stdout.into(),
            content_hash: None,
            archive_bytes: Vec::new(),
        }
    }

    /// Returns the archive size in bytes.
    #[inline]
    #[must_use]
    pub fn archive_len(&self) -> usize {
        self.archive_bytes.len()
    }
}
