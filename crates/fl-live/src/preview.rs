//! Local HTTP preview of the published output.
//!
//! ```text
//! PreviewServer::spawn ──► bind 127.0.0.1:<port> ──► axum::serve(ServeDir)
//!                                                         │
//! PreviewHandle::kill ──► CancellationToken ──► graceful shutdown ──► join
//! ```

use std::net::{Ipv4Addr, SocketAddr};

use async_trait::async_trait;
use axum::Router;
use camino::Utf8Path;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;

use crate::backend::{PreviewHandle, StaticFileServer};
use crate::error::LiveError;

/// First port tried when none is configured.
pub const FIRST_PREVIEW_PORT: u16 = 8089;

const PORT_ATTEMPTS: u16 = 100;

/// Serves a directory with `axum` and `tower-http`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreviewServer;

impl PreviewServer {
    /// Creates the server factory.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

async fn bind(port: Option<u16>) -> Result<TcpListener, LiveError> {
    if let Some(port) = port {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        return TcpListener::bind(addr)
            .await
            .map_err(|e| LiveError::preview(format!("cannot bind {addr}: {e}")));
    }

    for attempt in 0..PORT_ATTEMPTS {
        let Some(port) = FIRST_PREVIEW_PORT.checked_add(attempt) else {
            break;
        };
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(error) => tracing::trace!(port, error = %error, "Preview port taken"),
        }
    }
    Err(LiveError::preview(format!(
        "no free port found starting at {FIRST_PREVIEW_PORT}"
    )))
}

#[async_trait]
impl StaticFileServer for PreviewServer {
    async fn spawn(
        &self,
        directory: &Utf8Path,
        port: Option<u16>,
        open_browser: bool,
    ) -> Result<Box<dyn PreviewHandle>, LiveError> {
        if !directory.is_dir() {
            return Err(LiveError::MissingDirectory(directory.to_owned()));
        }

        let listener = bind(port).await?;
        let addr = listener.local_addr()?;
        let url = format!("http://localhost:{}", addr.port());

        let app = Router::new().fallback_service(ServeDir::new(directory.as_std_path()));
        let cancellation_token = CancellationToken::new();
        let token = cancellation_token.clone();

        let task = tokio::spawn(async move {
            let shutdown = async move { token.cancelled().await };
            if let Err(error) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::warn!(error = %error, "Preview server stopped with an error");
            }
        });

        tracing::info!(url = %url, dir = %directory, "Preview server listening");
        if open_browser {
            if let Err(error) = webbrowser::open(&url) {
                tracing::warn!(error = %error, url = %url, "Could not open browser");
            }
        }

        Ok(Box::new(RunningPreview {
            url,
            cancellation_token,
            task: Some(task),
        }))
    }
}

/// Handle to a preview server started by [`PreviewServer`].
#[derive(Debug)]
struct RunningPreview {
    url: String,
    cancellation_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

#[async_trait]
impl PreviewHandle for RunningPreview {
    fn url(&self) -> &str {
        &self.url
    }

    async fn kill(&mut self) {
        self.cancellation_token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                tracing::warn!(error = %error, "Preview server task failed");
            }
            tracing::info!(url = %self.url, "Preview server stopped");
        }
    }
}

impl Drop for RunningPreview {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}
