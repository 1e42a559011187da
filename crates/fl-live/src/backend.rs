//! Seams to the collaborators the rebuild loop drives but does not own.
//!
//! - [`CompileBackend`] - turns a sketch directory into a [`CompileResult`]
//! - [`LocalServer`] - lifecycle of a compile server the loop started itself
//! - [`StaticFileServer`] / [`PreviewHandle`] - serves published output
//! - [`TriggerSource`] - manual "rebuild now" input

use std::time::Duration;

use async_trait::async_trait;
use camino::Utf8Path;

use fl_core::{BuildMode, CompileResult};

use crate::error::LiveError;

/// Compiles a sketch against a backend host.
///
/// An `Err` means the backend could not be invoked at all; the loop treats
/// it like a failed compile whose output is the error message.
#[async_trait]
pub trait CompileBackend: Send + Sync {
    /// Compiles the sketch in `sketch_dir` on `host`.
    async fn compile(
        &self,
        sketch_dir: &Utf8Path,
        host: &str,
        build_mode: BuildMode,
        profile: bool,
    ) -> Result<CompileResult, LiveError>;
}

/// A compile server started and owned by this session.
#[async_trait]
pub trait LocalServer: Send + Sync {
    /// Starts the server and waits until it is ready.
    async fn start(&mut self) -> Result<(), LiveError>;

    /// Stops the server. Safe to call more than once.
    async fn stop(&mut self);

    /// Returns `true` while the server is running.
    async fn is_alive(&mut self) -> bool;

    /// Base URL compiles should be sent to.
    fn url(&self) -> String;
}

/// A running preview server.
#[async_trait]
pub trait PreviewHandle: Send + Sync {
    /// URL the published output is served at.
    fn url(&self) -> &str;

    /// Shuts the server down and waits for it to exit.
    async fn kill(&mut self);
}

/// Serves a directory of published output over HTTP.
#[async_trait]
pub trait StaticFileServer: Send + Sync {
    /// Starts serving `directory`.
    ///
    /// `port` is either a fixed port or `None` to pick a free one.
    async fn spawn(
        &self,
        directory: &Utf8Path,
        port: Option<u16>,
        open_browser: bool,
    ) -> Result<Box<dyn PreviewHandle>, LiveError>;
}

/// Manual rebuild requests.
#[async_trait]
pub trait TriggerSource: Send {
    /// Waits up to `timeout` for a request; returns `true` if one arrived
    /// since the last check.
    async fn triggered(&mut self, timeout: Duration) -> bool;

    /// Discards requests that are already queued.
    fn drain(&mut self);
}
