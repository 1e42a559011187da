//! A local compile server run as a child process.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Child;

use fl_probe::{HealthCheck, normalize_host};

use crate::backend::LocalServer;
use crate::command::shell;
use crate::error::LiveError;

const READY_POLL: Duration = Duration::from_millis(500);

/// Default time a starting server gets to pass its first health check.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs a compile server command and tracks the child process.
///
/// Readiness is decided by the health check alone, bypassing the prober's
/// cache: the cache would still hold the "nothing answered" result that led
/// to starting the server.
pub struct ProcessServer {
    command: String,
    url: String,
    health: Arc<dyn HealthCheck>,
    startup_timeout: Duration,
    child: Option<Child>,
}

impl std::fmt::Debug for ProcessServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessServer")
            .field("command", &self.command)
            .field("url", &self.url)
            .field("running", &self.child.is_some())
            .finish_non_exhaustive()
    }
}

impl ProcessServer {
    /// Creates a server that runs `command` and is reachable at `url`.
    #[must_use]
    pub fn new(command: impl Into<String>, url: &str, health: Arc<dyn HealthCheck>) -> Self {
        Self {
            command: command.into(),
            url: normalize_host(url),
            health,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            child: None,
        }
    }

    /// Overrides how long startup may take.
    #[must_use]
    pub const fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    async fn wait_ready(&mut self) -> Result<(), LiveError> {
        let deadline = tokio::time::Instant::now() + self.startup_timeout;
        loop {
            if !self.is_alive().await {
                return Err(LiveError::server_start(format!(
                    "`{}` exited during startup",
                    self.command
                )));
            }
            match self.health.check(&self.url, true).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(error) => tracing::trace!(error = %error, "Server not ready yet"),
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(LiveError::server_start(format!(
                    "{} did not become healthy within {}s",
                    self.url,
                    self.startup_timeout.as_secs()
                )));
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }
}

#[async_trait]
impl LocalServer for ProcessServer {
    async fn start(&mut self) -> Result<(), LiveError> {
        if self.child.is_some() {
            return Ok(());
        }
        let child = shell(&self.command)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LiveError::server_start(format!("failed to run `{}`: {e}", self.command)))?;
        tracing::info!(pid = ?child.id(), command = %self.command, "Compile server started");
        self.child = Some(child);

        let ready = self.wait_ready().await;
        if ready.is_ok() {
            tracing::info!(url = %self.url, "Compile server ready");
        }
        ready
    }

    async fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if let Err(error) = child.kill().await {
            tracing::debug!(error = %error, "Compile server already gone");
        }
        tracing::info!(url = %self.url, "Compile server stopped");
    }

    async fn is_alive(&mut self) -> bool {
        match self.child.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                tracing::debug!(%status, "Compile server exited");
                false
            }
            Some(Err(error)) => {
                tracing::warn!(error = %error, "Could not query compile server status");
                false
            }
            None => false,
        }
    }

    fn url(&self) -> String {
        self.url.clone()
    }
}
