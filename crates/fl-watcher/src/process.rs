//! Runs a [`FileWatcher`] on a blocking worker and relays its changes to
//! async code.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Blocking Thread (spawn_blocking)             │
//! │  ┌──────────────────┐    ┌────────────────┐    ┌────────────┐  │
//! │  │ FileWatcher      │ -> │ get_next_change│ -> │ ChangeEvent│  │
//! │  │ (notify + hashes)│    │ (100ms polls)  │    │            │  │
//! │  └──────────────────┘    └────────────────┘    └─────┬──────┘  │
//! └──────────────────────────────────────────────────────│─────────┘
//!                                                        │
//!                                          blocking_send │ (bounded)
//!                                                        ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Async Runtime (tokio)                        │
//! │  ┌──────────────────┐    ┌────────────────┐                     │
//! │  │ WatcherProcess   │    │ mpsc::Receiver │ -> DebouncedBatcher │
//! │  │ (shutdown ctrl)  │    │ (changes)      │                     │
//! │  └──────────────────┘    └────────────────┘                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use fl_core::WatchConfig;

use crate::error::WatchError;
use crate::events::ChangeEvent;
use crate::filter::FileFilter;
use crate::watcher::FileWatcher;

/// How long the worker blocks in one `get_next_change` call before it
/// re-checks the shutdown signal.
const WORKER_POLL: Duration = Duration::from_millis(100);

/// A [`FileWatcher`] running on its own blocking worker.
///
/// # Lifecycle
///
/// 1. **Creation**: [`WatcherProcess::new`] builds the watcher (so startup
///    errors surface immediately) and spawns the worker.
/// 2. **Reception**: [`get_all_changes`](Self::get_all_changes) drains what
///    the worker has relayed.
/// 3. **Shutdown**: [`stop`](Self::stop) signals the worker, joins it and
///    discards undelivered changes. Dropping sends the signal without
///    joining.
pub struct WatcherProcess {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task_handle: Option<JoinHandle<()>>,
    event_rx: mpsc::Receiver<ChangeEvent>,
    root: Utf8PathBuf,
}

impl std::fmt::Debug for WatcherProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherProcess")
            .field("root", &self.root)
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl WatcherProcess {
    /// Starts watching `root` on a blocking worker.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns the [`FileWatcher`] construction error, if any.
    #[allow(clippy::unused_async)] // Async so callers cannot spawn outside a runtime
    pub async fn new<F: FileFilter>(
        root: &Utf8Path,
        config: &WatchConfig,
        filter: F,
    ) -> Result<Self, WatchError> {
        let watcher = FileWatcher::new(root, config, filter)?;
        Ok(Self::spawn(watcher, config.channel_capacity))
    }

    /// Moves an existing watcher onto a blocking worker.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(watcher: FileWatcher, channel_capacity: usize) -> Self {
        let root = watcher.root().to_owned();
        let (event_tx, event_rx) = mpsc::channel(channel_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task_handle =
            tokio::task::spawn_blocking(move || run_worker(watcher, event_tx, shutdown_rx));

        Self {
            shutdown_tx: Some(shutdown_tx),
            task_handle: Some(task_handle),
            event_rx,
            root,
        }
    }

    /// Collects relayed changes.
    ///
    /// With `Some(timeout)`, each retrieval waits up to `timeout` and
    /// draining continues while changes keep arriving within that window.
    /// With `None`, only already-buffered changes are returned.
    pub async fn get_all_changes(&mut self, timeout: Option<Duration>) -> Vec<ChangeEvent> {
        let mut changes = Vec::new();
        match timeout {
            None => {
                while let Ok(event) = self.event_rx.try_recv() {
                    changes.push(event);
                }
            }
            Some(timeout) => {
                while let Ok(Some(event)) =
                    tokio::time::timeout(timeout, self.event_rx.recv()).await
                {
                    changes.push(event);
                }
            }
        }

        if changes.is_empty() {
            self.reap_finished_worker().await;
        }
        changes
    }

    /// Returns the canonical watched root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns `true` while the worker is alive.
    ///
    /// A worker that exited on its own (panic, backend failure) reports
    /// `false`; later polls return nothing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some() && self.task_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the worker, waits for it to exit and discards pending changes.
    ///
    /// Calling `stop` more than once is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::WorkerFailed`] if the worker panicked.
    pub async fn stop(&mut self) -> Result<(), WatchError> {
        // Closing first unblocks a worker stuck in `blocking_send`.
        self.event_rx.close();
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        let result = match self.task_handle.take() {
            Some(handle) => handle
                .await
                .map_err(|error| WatchError::WorkerFailed(error.to_string())),
            None => Ok(()),
        };

        let mut discarded = 0_usize;
        while self.event_rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            tracing::debug!(path = %self.root, discarded, "Discarded undelivered changes");
        }
        result
    }

    async fn reap_finished_worker(&mut self) {
        if !self.task_handle.as_ref().is_some_and(JoinHandle::is_finished) {
            return;
        }
        if let Some(handle) = self.task_handle.take() {
            match handle.await {
                Ok(()) => tracing::warn!(path = %self.root, "File watcher exited unexpectedly"),
                Err(error) => {
                    tracing::error!(path = %self.root, error = %error, "File watcher worker failed");
                }
            }
        }
    }
}

impl Drop for WatcherProcess {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[allow(clippy::needless_pass_by_value)] // Owned for the blocking task lifetime
fn run_worker(
    mut watcher: FileWatcher,
    event_tx: mpsc::Sender<ChangeEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    tracing::info!(path = %watcher.root(), "File watcher started");

    loop {
        match shutdown_rx.try_recv() {
            Err(TryRecvError::Empty) => {}
            Ok(()) | Err(TryRecvError::Closed) => break,
        }

        let Some(path) = watcher.get_next_change(WORKER_POLL) else {
            continue;
        };
        tracing::debug!(path = %path, "File content changed");

        if event_tx.blocking_send(ChangeEvent::new(path)).is_err() {
            tracing::debug!("Change channel closed, stopping watcher");
            break;
        }
    }

    tracing::info!(path = %watcher.root(), "File watcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::AcceptAllFilter;
    use std::fs;
    use tempfile::TempDir;

    fn quick_config() -> WatchConfig {
        WatchConfig {
            path_debounce_ms: 0,
            ..WatchConfig::default()
        }
    }

    #[tokio::test]
    async fn test_process_path_not_found() {
        let result = WatcherProcess::new(
            Utf8Path::new("/nonexistent/watch/root"),
            &WatchConfig::default(),
            AcceptAllFilter,
        )
        .await;
        assert!(matches!(result, Err(WatchError::PathNotFound(_))));
    }

    #[tokio::test]
    async fn test_process_relays_changes() {
        let dir = TempDir::new().expect("temp dir");
        let root = Utf8Path::from_path(dir.path()).expect("UTF-8");
        let mut process = WatcherProcess::new(root, &quick_config(), AcceptAllFilter)
            .await
            .expect("process");
        assert!(process.is_running());

        fs::write(dir.path().join("a.ino"), "one").expect("write");

        let mut seen = Vec::new();
        for _ in 0..20 {
            seen.extend(process.get_all_changes(Some(Duration::from_millis(100))).await);
            if !seen.is_empty() {
                break;
            }
        }

        // The worker may hash between create and write, so one or two events.
        assert!(!seen.is_empty());
        assert!(seen.iter().all(|event| event.file_name() == Some("a.ino")));

        process.stop().await.expect("stop");
        assert!(!process.is_running());
    }

    #[tokio::test]
    async fn test_process_none_timeout_does_not_wait() {
        let dir = TempDir::new().expect("temp dir");
        let root = Utf8Path::from_path(dir.path()).expect("UTF-8");
        let mut process = WatcherProcess::new(root, &quick_config(), AcceptAllFilter)
            .await
            .expect("process");

        let start = std::time::Instant::now();
        assert!(process.get_all_changes(None).await.is_empty());
        assert!(start.elapsed() < Duration::from_millis(500));

        process.stop().await.expect("stop");
    }

    #[tokio::test]
    async fn test_process_stop_is_idempotent() {
        let dir = TempDir::new().expect("temp dir");
        let root = Utf8Path::from_path(dir.path()).expect("UTF-8");
        let mut process = WatcherProcess::new(root, &quick_config(), AcceptAllFilter)
            .await
            .expect("process");

        process.stop().await.expect("first stop");
        process.stop().await.expect("second stop");
        assert!(process.get_all_changes(None).await.is_empty());
    }
}
