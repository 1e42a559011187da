//! Sliding-window batching of watcher changes.
//!
//! [`DebouncedBatcher`] is poll-driven: every call first pulls whatever the
//! [`WatcherProcess`] has relayed, then consults a [`DebounceState`]:
//!
//! ```text
//!            changes arrived                  changes arrived
//!   ┌──────┐ ───────────────► ┌───────────┐ ◄─────────────────┐
//!   │ Idle │                  │ Pending   │ ──────────────────┘
//!   └──────┘ ◄─────────────── └───────────┘  (merge, reset timer)
//!        quiet for > window:
//!        flush sorted paths
//! ```
//!
//! Flush timing is bounded below by the window and above by the caller's
//! poll cadence; nothing flushes between polls.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use camino::Utf8PathBuf;

use fl_core::{SharedClock, SystemClock};

use crate::error::WatchError;
use crate::events::ChangeBatch;
use crate::process::WatcherProcess;

/// Something the rebuild loop can poll for flushed batches.
///
/// [`DebouncedBatcher`] is the production implementation; the trait lets
/// the loop be driven by scripted sources in tests.
#[async_trait]
pub trait ChangeSource: Send {
    /// Returns a flushed batch, or an empty batch if nothing is ready.
    async fn poll_changes(&mut self) -> ChangeBatch;

    /// Stops the underlying watcher. Safe to call more than once.
    async fn stop(&mut self);
}

/// Pending-batch state of a [`DebouncedBatcher`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DebounceState {
    /// Nothing pending.
    #[default]
    Idle,
    /// Changes seen, waiting for a quiet period.
    Pending {
        /// When the most recent change arrived.
        last_activity: Instant,
        /// Distinct changed paths, kept sorted.
        paths: BTreeSet<Utf8PathBuf>,
    },
}

impl DebounceState {
    /// Merges `paths` into the pending set and restarts the quiet period.
    ///
    /// An empty input leaves the state unchanged.
    pub fn record<I>(&mut self, paths: I, now: Instant)
    where
        I: IntoIterator<Item = Utf8PathBuf>,
    {
        let mut incoming = paths.into_iter().peekable();
        if incoming.peek().is_none() {
            return;
        }

        match self {
            Self::Idle => {
                *self = Self::Pending {
                    last_activity: now,
                    paths: incoming.collect(),
                };
            }
            Self::Pending {
                last_activity,
                paths,
            } => {
                paths.extend(incoming);
                *last_activity = now;
            }
        }
    }

    /// Flushes the pending set if it has been quiet for longer than `window`.
    pub fn poll(&mut self, now: Instant, window: Duration) -> Option<ChangeBatch> {
        let quiet = match self {
            Self::Idle => return None,
            Self::Pending { last_activity, .. } => {
                now.saturating_duration_since(*last_activity) > window
            }
        };
        if !quiet {
            return None;
        }

        match std::mem::take(self) {
            Self::Pending { paths, .. } => Some(ChangeBatch::from(paths)),
            Self::Idle => None,
        }
    }

    /// Returns the number of pending paths.
    #[must_use]
    pub fn pending(&self) -> usize {
        match self {
            Self::Idle => 0,
            Self::Pending { paths, .. } => paths.len(),
        }
    }
}

/// Coalesces bursts of watcher changes into single, deduplicated batches.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use fl_core::WatchConfig;
/// use fl_watcher::{AcceptAllFilter, DebouncedBatcher, WatcherProcess};
/// use camino::Utf8Path;
///
/// # async fn example() -> Result<(), fl_watcher::WatchError> {
/// let config = WatchConfig::default();
/// let process = WatcherProcess::new(Utf8Path::new("./sketch"), &config, AcceptAllFilter).await?;
/// let mut batcher = DebouncedBatcher::new(process, config.debounce());
///
/// loop {
///     let batch = batcher.get_all_changes().await;
///     if !batch.is_empty() {
///         println!("{} files changed", batch.len());
///         break;
///     }
///     tokio::time::sleep(Duration::from_millis(250)).await;
/// }
/// batcher.stop().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct DebouncedBatcher {
    process: WatcherProcess,
    state: DebounceState,
    window: Duration,
    clock: SharedClock,
}

impl DebouncedBatcher {
    /// Wraps `process` with a quiet-period window.
    #[must_use]
    pub fn new(process: WatcherProcess, window: Duration) -> Self {
        Self::with_clock(process, window, SystemClock::shared())
    }

    /// Wraps `process` with an explicit clock.
    #[must_use]
    pub fn with_clock(process: WatcherProcess, window: Duration, clock: SharedClock) -> Self {
        Self {
            process,
            state: DebounceState::Idle,
            window,
            clock,
        }
    }

    /// Polls the watcher and returns a batch once activity has quiesced.
    ///
    /// Returns an empty batch while changes are still arriving, while the
    /// window has not elapsed, and when nothing is pending.
    pub async fn get_all_changes(&mut self) -> ChangeBatch {
        let events = self.process.get_all_changes(None).await;
        let now = self.clock.now();

        if !events.is_empty() {
            tracing::trace!(count = events.len(), "Batching changes");
            self.state.record(events.into_iter().map(|e| e.path), now);
            return ChangeBatch::new();
        }

        match self.state.poll(now, self.window) {
            Some(batch) => {
                tracing::debug!(
                    path = %self.process.root(),
                    count = batch.len(),
                    "Flushing change batch"
                );
                batch
            }
            None => ChangeBatch::new(),
        }
    }

    /// Returns the current pending state.
    #[must_use]
    pub fn state(&self) -> &DebounceState {
        &self.state
    }

    /// Returns `true` while the underlying watcher is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.process.is_running()
    }

    /// Stops the underlying watcher and drops any pending batch.
    pub async fn stop(&mut self) -> Result<(), WatchError> {
        self.state = DebounceState::Idle;
        self.process.stop().await
    }
}

#[async_trait]
impl ChangeSource for DebouncedBatcher {
    async fn poll_changes(&mut self) -> ChangeBatch {
        self.get_all_changes().await
    }

    async fn stop(&mut self) {
        if let Err(error) = DebouncedBatcher::stop(self).await {
            tracing::warn!(error = %error, "Failed to stop file watcher cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::AcceptAllFilter;
    use camino::Utf8Path;
    use fl_core::{Clock, ManualClock, WatchConfig};
    use std::sync::Arc;
    use tempfile::TempDir;

    const WINDOW: Duration = Duration::from_secs(2);

    fn paths(items: &[&str]) -> Vec<Utf8PathBuf> {
        items.iter().map(|p| Utf8PathBuf::from(*p)).collect()
    }

    #[test]
    fn test_state_flushes_only_after_quiet_window() {
        let clock = ManualClock::new();
        let mut state = DebounceState::default();

        state.record(paths(&["b.ino", "a.h"]), clock.now());
        assert_eq!(state.pending(), 2);

        clock.advance(Duration::from_secs(1));
        assert_eq!(state.poll(clock.now(), WINDOW), None);

        clock.advance(Duration::from_secs(1));
        assert_eq!(state.poll(clock.now(), WINDOW), None, "window is exclusive");

        clock.advance(Duration::from_millis(1));
        let batch = state.poll(clock.now(), WINDOW).expect("flush");
        let flushed: Vec<_> = batch.iter().map(|p| p.as_str()).collect();
        assert_eq!(flushed, vec!["a.h", "b.ino"]);

        assert_eq!(state, DebounceState::Idle);
        assert_eq!(state.poll(clock.now(), WINDOW), None, "never flushed twice");
    }

    #[test]
    fn test_state_burst_extends_window_and_dedups() {
        let clock = ManualClock::new();
        let mut state = DebounceState::default();

        state.record(paths(&["sketch.ino"]), clock.now());
        clock.advance(Duration::from_millis(1500));
        state.record(paths(&["sketch.ino", "fx.h"]), clock.now());

        clock.advance(Duration::from_millis(1500));
        assert_eq!(state.poll(clock.now(), WINDOW), None);

        clock.advance(Duration::from_millis(600));
        let batch = state.poll(clock.now(), WINDOW).expect("flush");
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_state_ignores_empty_record() {
        let clock = ManualClock::new();
        let mut state = DebounceState::default();
        state.record(Vec::new(), clock.now());
        assert_eq!(state, DebounceState::Idle);
    }

    #[tokio::test]
    async fn test_batcher_flushes_real_changes_once() {
        let dir = TempDir::new().expect("temp dir");
        let root = Utf8Path::from_path(dir.path()).expect("UTF-8");
        let config = WatchConfig {
            debounce_ms: 300,
            path_debounce_ms: 0,
            ..WatchConfig::default()
        };
        let process = WatcherProcess::new(root, &config, AcceptAllFilter)
            .await
            .expect("process");
        let mut batcher = DebouncedBatcher::new(process, config.debounce());

        std::fs::write(dir.path().join("a.ino"), "1").expect("write");
        std::fs::write(dir.path().join("b.h"), "2").expect("write");

        let mut batches = Vec::new();
        for _ in 0..30 {
            let batch = batcher.get_all_changes().await;
            if !batch.is_empty() {
                batches.push(batch);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        assert_eq!(batches.len(), 1);
        let names: Vec<_> = batches[0].iter().filter_map(|p| p.file_name()).collect();
        assert_eq!(names, vec!["a.ino", "b.h"]);

        batcher.stop().await.expect("stop");
        assert!(!batcher.is_running());
    }

    #[tokio::test]
    async fn test_batcher_uses_injected_clock() {
        let dir = TempDir::new().expect("temp dir");
        let root = Utf8Path::from_path(dir.path()).expect("UTF-8");
        let process = WatcherProcess::new(root, &WatchConfig::default(), AcceptAllFilter)
            .await
            .expect("process");
        let clock = Arc::new(ManualClock::new());
        let mut batcher =
            DebouncedBatcher::with_clock(process, WINDOW, Arc::clone(&clock) as SharedClock);

        assert!(batcher.get_all_changes().await.is_empty());
        assert_eq!(batcher.state(), &DebounceState::Idle);

        ChangeSource::stop(&mut batcher).await;
    }
}
