//! Manual rebuild triggers.
//!
//! [`StdinTrigger`] turns every line read from stdin (pressing Enter) into a
//! rebuild request. The read happens on a dedicated OS thread: a pending
//! stdin read cannot be interrupted, and a detached thread does not hold up
//! process exit the way a runtime blocking task would.
//!
//! ```text
//! ┌──────────── stdin-trigger thread ────────────┐
//! │ stdin.lines() ──► try_send(()) (bounded, 8)  │
//! └──────────────────────┬───────────────────────┘
//!                        ▼
//!        StdinTrigger::triggered(timeout) / drain()
//! ```

use std::io::BufRead;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::TriggerSource;
use crate::error::LiveError;

/// Presses beyond this many unread ones are dropped.
const PRESS_CAPACITY: usize = 8;

/// Rebuild requests read from stdin.
#[derive(Debug)]
pub struct StdinTrigger {
    presses: mpsc::Receiver<()>,
    cancellation_token: CancellationToken,
    closed: bool,
}

impl StdinTrigger {
    /// Starts the background reader.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::Io`] if the reader thread cannot be spawned.
    pub fn spawn() -> Result<Self, LiveError> {
        let (tx, presses) = mpsc::channel(PRESS_CAPACITY);
        let cancellation_token = CancellationToken::new();
        let token = cancellation_token.clone();

        std::thread::Builder::new()
            .name("stdin-trigger".to_owned())
            .spawn(move || read_lines(std::io::stdin().lock(), &tx, &token))?;

        Ok(Self {
            presses,
            cancellation_token,
            closed: false,
        })
    }

    /// Builds a trigger fed by `lines` instead of stdin.
    #[cfg(test)]
    fn from_reader<R: BufRead + Send + 'static>(lines: R) -> Self {
        let (tx, presses) = mpsc::channel(PRESS_CAPACITY);
        let cancellation_token = CancellationToken::new();
        let token = cancellation_token.clone();
        std::thread::spawn(move || read_lines(lines, &tx, &token));
        Self {
            presses,
            cancellation_token,
            closed: false,
        }
    }
}

fn read_lines<R: BufRead>(reader: R, tx: &mpsc::Sender<()>, token: &CancellationToken) {
    for line in reader.lines() {
        if token.is_cancelled() {
            break;
        }
        match line {
            Ok(_) => match tx.try_send(()) {
                Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {}
                Err(mpsc::error::TrySendError::Closed(())) => break,
            },
            Err(error) => {
                tracing::warn!(error = %error, "Stopped reading rebuild requests from stdin");
                break;
            }
        }
    }
    tracing::debug!("stdin trigger reader finished");
}

#[async_trait]
impl TriggerSource for StdinTrigger {
    async fn triggered(&mut self, timeout: Duration) -> bool {
        if self.closed {
            tokio::time::sleep(timeout).await;
            return false;
        }
        match tokio::time::timeout(timeout, self.presses.recv()).await {
            Ok(Some(())) => true,
            Ok(None) => {
                tracing::debug!("stdin closed; manual rebuilds disabled");
                self.closed = true;
                false
            }
            Err(_elapsed) => false,
        }
    }

    fn drain(&mut self) {
        while self.presses.try_recv().is_ok() {}
    }
}

impl Drop for StdinTrigger {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}

/// A trigger that never fires; it only paces the loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverTrigger;

#[async_trait]
impl TriggerSource for NeverTrigger {
    async fn triggered(&mut self, timeout: Duration) -> bool {
        tokio::time::sleep(timeout).await;
        false
    }

    fn drain(&mut self) {}
}
