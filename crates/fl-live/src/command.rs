//! A compile backend that shells out to a user-supplied command.
//!
//! The command runs in the sketch directory with the build parameters in its
//! environment:
//!
//! | variable             | value                          |
//! |----------------------|--------------------------------|
//! | `FASTLED_BUILD_MODE` | `debug`, `quick` or `release`  |
//! | `FASTLED_PROFILE`    | `1` or `0`                     |
//! | `FASTLED_HOST`       | resolved backend URL           |
//!
//! On success the output directory is zipped into the [`CompileResult`].
//! Its hash is the trimmed contents of `hash.txt` when the command wrote
//! one, otherwise a digest over every output file.

use std::io::{Cursor, Write};
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use tokio::process::Command;
use zip::write::SimpleFileOptions;

use fl_core::{BuildMode, CompileResult, ContentHash};

use crate::backend::CompileBackend;
use crate::error::LiveError;

/// File in the output directory that carries a backend-computed hash.
pub const HASH_FILE: &str = "hash.txt";

/// Compiles by running a shell command.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    command: String,
    output_dir: Utf8PathBuf,
}

impl CommandBackend {
    /// Creates a backend running `command`.
    ///
    /// A relative `output_dir` is resolved against the sketch directory.
    #[must_use]
    pub fn new(command: impl Into<String>, output_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            command: command.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Returns the command line.
    #[inline]
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    fn output_dir_for(&self, sketch_dir: &Utf8Path) -> Utf8PathBuf {
        if self.output_dir.is_absolute() {
            self.output_dir.clone()
        } else {
            sketch_dir.join(&self.output_dir)
        }
    }
}

/// Builds a command that runs `command` through the platform shell.
#[cfg(windows)]
pub(crate) fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

/// Builds a command that runs `command` through the platform shell.
#[cfg(not(windows))]
pub(crate) fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[async_trait]
impl CompileBackend for CommandBackend {
    async fn compile(
        &self,
        sketch_dir: &Utf8Path,
        host: &str,
        build_mode: BuildMode,
        profile: bool,
    ) -> Result<CompileResult, LiveError> {
        tracing::debug!(command = %self.command, dir = %sketch_dir, "Running compile command");

        let output = shell(&self.command)
            .current_dir(sketch_dir)
            .env("FASTLED_BUILD_MODE", build_mode.as_str())
            .env("FASTLED_PROFILE", if profile { "1" } else { "0" })
            .env("FASTLED_HOST", host)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| LiveError::backend(format!("failed to run `{}`: {e}", self.command)))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            combined.push_str(&format!("\n{}", output.status));
            return Ok(CompileResult::failure(combined));
        }

        let out_dir = self.output_dir_for(sketch_dir);
        if !out_dir.is_dir() {
            return Err(LiveError::MissingDirectory(out_dir));
        }

        let (archive, hash) = tokio::task::spawn_blocking(move || archive_directory(&out_dir))
            .await
            .map_err(|e| LiveError::backend(format!("archive task failed: {e}")))??;

        Ok(CompileResult::success(combined, Some(hash), archive))
    }
}

/// Zips every file under `dir` and computes the content hash.
///
/// Entries are stored under their `/`-separated path relative to `dir`, in
/// sorted order.
pub fn archive_directory(dir: &Utf8Path) -> Result<(Vec<u8>, ContentHash), LiveError> {
    let mut files = Vec::new();
    collect_files(dir.as_std_path(), "", &mut files)?;
    files.sort();

    let mut contents = Vec::with_capacity(files.len());
    for (relative, path) in &files {
        contents.push((relative.as_str(), std::fs::read(path)?));
    }

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (relative, bytes) in &contents {
        zip.start_file(*relative, options)?;
        zip.write_all(bytes)?;
    }
    let archive = zip.finish()?.into_inner();

    let reported = contents
        .iter()
        .find(|(relative, _)| *relative == HASH_FILE)
        .map(|(_, bytes)| ContentHash::new(String::from_utf8_lossy(bytes)))
        .filter(|hash| !hash.as_str().is_empty());

    let hash = reported.unwrap_or_else(|| {
        ContentHash::of_entries(contents.iter().map(|(name, bytes)| (*name, bytes.as_slice())))
    });
    Ok((archive, hash))
}

fn collect_files(
    dir: &Path,
    prefix: &str,
    out: &mut Vec<(String, std::path::PathBuf)>,
) -> Result<(), LiveError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            tracing::warn!(path = %entry.path().display(), "Skipping non-UTF-8 output file");
            continue;
        };
        let relative = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&entry.path(), &relative, out)?;
        } else if file_type.is_file() {
            out.push((relative, entry.path()));
        }
    }
    Ok(())
}
