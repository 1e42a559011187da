//! Synchronous content-hash-aware file watcher.
//!
//! [`FileWatcher`] wraps the platform-recommended `notify` backend. Raw
//! events land in a std channel; [`FileWatcher::get_next_change`] drains
//! that channel on the caller's thread, hashes modified files through a
//! [`ChangeTracker`] and hands back one changed path at a time.
//!
//! ```text
//! ┌──────────────────┐  std mpsc  ┌──────────────────────────────────┐
//! │ RecommendedWatcher│ ─────────► │ get_next_change(timeout)         │
//! │ (notify thread)  │            │  filter → hash → per-path debounce│
//! └──────────────────┘            └──────────────────────────────────┘
//! ```
//!
//! The watcher blocks while waiting, so async code should run it through
//! [`WatcherProcess`](crate::WatcherProcess).

use std::collections::VecDeque;
use std::sync::mpsc as std_mpsc;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use fl_core::{SharedClock, SystemClock, WatchConfig};

use crate::error::WatchError;
use crate::filter::FileFilter;
use crate::tracker::ChangeTracker;

type RawEvent = notify::Result<notify::Event>;

/// Watches one directory tree and reports files whose content changed.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use fl_core::WatchConfig;
/// use fl_watcher::{ExcludeComponentsFilter, FileWatcher};
/// use camino::Utf8Path;
///
/// # fn example() -> Result<(), fl_watcher::WatchError> {
/// let mut watcher = FileWatcher::new(
///     Utf8Path::new("./sketch"),
///     &WatchConfig::default(),
///     ExcludeComponentsFilter::new(["fastled_js"]),
/// )?;
///
/// if let Some(path) = watcher.get_next_change(Duration::from_millis(100)) {
///     println!("changed: {path}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct FileWatcher {
    tracker: ChangeTracker,
    raw_rx: std_mpsc::Receiver<RawEvent>,
    pending: VecDeque<Utf8PathBuf>,
    // Dropping the backend stops notify's thread and closes `raw_rx`.
    _backend: RecommendedWatcher,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("tracker", &self.tracker)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl FileWatcher {
    /// Starts watching `root` recursively.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::PathNotFound`] if `root` doesn't exist and
    /// [`WatchError::Notify`] if the backend fails to start.
    pub fn new<F: FileFilter>(
        root: &Utf8Path,
        config: &WatchConfig,
        filter: F,
    ) -> Result<Self, WatchError> {
        Self::with_clock(root, config, filter, SystemClock::shared())
    }

    /// Starts watching `root` with an explicit clock for the per-path
    /// debounce.
    pub fn with_clock<F: FileFilter>(
        root: &Utf8Path,
        config: &WatchConfig,
        filter: F,
        clock: SharedClock,
    ) -> Result<Self, WatchError> {
        if !root.exists() {
            return Err(WatchError::path_not_found(root));
        }
        let root = root.canonicalize_utf8()?;

        let (raw_tx, raw_rx) = std_mpsc::channel();
        let mut backend = notify::recommended_watcher(raw_tx)?;
        backend.watch(root.as_std_path(), RecursiveMode::Recursive)?;

        tracing::debug!(path = %root, "notify backend watching");

        Ok(Self {
            tracker: ChangeTracker::new(root, filter, config.path_debounce(), clock),
            raw_rx,
            pending: VecDeque::new(),
            _backend: backend,
        })
    }

    /// Returns the next changed path, waiting up to `timeout`.
    ///
    /// Returns `None` when nothing changed within `timeout` or the backend
    /// has shut down. Raw events that turn out to be byte-identical
    /// rewrites, filtered paths or per-path repeats are consumed silently
    /// while waiting.
    pub fn get_next_change(&mut self, timeout: Duration) -> Option<Utf8PathBuf> {
        let deadline = Instant::now() + timeout;
        loop {
            while let Some(path) = self.pending.pop_front() {
                if self.tracker.admit(&path) {
                    return Some(path);
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let raw = if remaining.is_zero() {
                self.raw_rx.try_recv().ok()?
            } else {
                self.raw_rx.recv_timeout(remaining).ok()?
            };
            self.ingest(raw);
        }
    }

    /// Returns the canonical watched root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        self.tracker.root()
    }

    fn ingest(&mut self, raw: RawEvent) {
        let event = match raw {
            Ok(event) => event,
            Err(error) => {
                tracing::warn!(error = %error, "File watcher backend error");
                return;
            }
        };

        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            return;
        }

        for path in event.paths {
            let path = match Utf8PathBuf::try_from(path) {
                Ok(path) => path,
                Err(error) => {
                    let invalid = error.into_path_buf();
                    tracing::warn!(
                        path = %invalid.display(),
                        "Skipping non-UTF-8 path in file event"
                    );
                    continue;
                }
            };

            if self.tracker.observe(&path) && !self.pending.contains(&path) {
                self.pending.push_back(path);
            }
        }
    }
}
