//! Publishing compile output with skip-redeploy.
//!
//! [`Deployer`] owns the serving directory and the hash of what is currently
//! published in it. A successful result is unpacked only when its hash
//! differs from the published one; a failed result replaces the output with
//! an error page and forgets the published hash, so the next success always
//! lands.
//!
//! The serving directory is wiped on every publish, so it is always a single
//! plain directory name joined onto the sketch directory, never the sketch
//! itself or anything above it.

use std::io::{self, Cursor};
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use zip::ZipArchive;

use fl_core::{CompileResult, ContentHash, validate_dir_name};

use crate::error::LiveError;

/// File written into the serving directory when a compile fails.
pub const ERROR_PAGE: &str = "index.html";

/// What [`Deployer::publish`] did with a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// The archive was unpacked into the serving directory.
    Deployed {
        /// Number of files written.
        files: usize,
    },
    /// The hash matched the published output; nothing was touched.
    Skipped,
    /// The compile failed; an error page was written.
    Failed,
}

impl DeployOutcome {
    /// Returns `true` for [`DeployOutcome::Deployed`].
    #[inline]
    #[must_use]
    pub const fn is_deployed(&self) -> bool {
        matches!(self, Self::Deployed { .. })
    }
}

/// Publishes compile results into a serving directory.
#[derive(Debug)]
pub struct Deployer {
    serving_dir: Utf8PathBuf,
    last_deployed_hash: Option<ContentHash>,
}

impl Deployer {
    /// Creates a deployer publishing into `sketch_dir/dir_name`. Nothing is
    /// published yet.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::Config`] unless `dir_name` is a single plain
    /// directory name. `.`, `..` and nested or absolute paths would put the
    /// sketch sources, or the directories above them, under the wipe that
    /// precedes every publish.
    pub fn new(sketch_dir: &Utf8Path, dir_name: &str) -> Result<Self, LiveError> {
        validate_dir_name("live.serving_dir", dir_name)?;
        Ok(Self {
            serving_dir: sketch_dir.join(dir_name),
            last_deployed_hash: None,
        })
    }

    /// Returns the serving directory.
    #[inline]
    #[must_use]
    pub fn serving_dir(&self) -> &Utf8Path {
        &self.serving_dir
    }

    /// Returns the hash of the published output, if known.
    #[inline]
    #[must_use]
    pub fn last_deployed_hash(&self) -> Option<&ContentHash> {
        self.last_deployed_hash.as_ref()
    }

    /// Publishes `result`.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive is malformed, contains an entry that
    /// escapes the serving directory, or the filesystem refuses a write. An
    /// archive rejected before the old output was removed keeps the published
    /// hash; once removal has started the hash is cleared.
    pub fn publish(&mut self, result: &CompileResult) -> Result<DeployOutcome, LiveError> {
        if !result.success {
            self.last_deployed_hash = None;
            self.write_error_page(&result.stdout)?;
            return Ok(DeployOutcome::Failed);
        }

        if let (Some(new), Some(published)) = (&result.content_hash, &self.last_deployed_hash) {
            if new == published {
                return Ok(DeployOutcome::Skipped);
            }
        }

        let files = self.unpack(&result.archive_bytes)?;
        self.last_deployed_hash.clone_from(&result.content_hash);
        Ok(DeployOutcome::Deployed { files })
    }

    fn unpack(&mut self, archive_bytes: &[u8]) -> Result<usize, LiveError> {
        let mut archive = ZipArchive::new(Cursor::new(archive_bytes))?;

        // Validate every entry before touching the published output.
        let mut entries: Vec<(usize, PathBuf, bool)> = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let entry = archive.by_index(index)?;
            let Some(relative) = entry.enclosed_name() else {
                return Err(LiveError::UnsafeArchiveEntry(entry.name().to_owned()));
            };
            entries.push((index, relative, entry.is_dir()));
        }

        self.last_deployed_hash = None;
        self.clear()?;

        let mut files = 0;
        for (index, relative, is_dir) in entries {
            let target = self.serving_dir.as_std_path().join(relative);
            if is_dir {
                std::fs::create_dir_all(&target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut entry = archive.by_index(index)?;
            let mut out = std::fs::File::create(&target)?;
            io::copy(&mut entry, &mut out)?;
            files += 1;
        }
        Ok(files)
    }

    fn clear(&self) -> io::Result<()> {
        match std::fs::remove_dir_all(&self.serving_dir) {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => return Err(error),
        }
        std::fs::create_dir_all(&self.serving_dir)
    }

    fn write_error_page(&self, output: &str) -> io::Result<()> {
        self.clear()?;
        std::fs::write(self.serving_dir.join(ERROR_PAGE), render_error_page(output))
    }
}

/// Renders compiler output as a minimal HTML page.
#[must_use]
pub fn render_error_page(output: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Compile failed</title></head>\n\
         <body>\n<h1>Compile failed</h1>\n<pre>{}</pre>\n</body>\n</html>\n",
        escape_html(output)
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
