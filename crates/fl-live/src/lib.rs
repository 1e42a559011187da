//! The fled rebuild loop.
//!
//! # Overview
//!
//! [`RebuildOrchestrator`] ties the other crates together: it compiles a
//! sketch once, then watches it and recompiles on every debounced batch of
//! real changes or on a manual trigger. Output is published into the
//! sketch's serving directory only when its content hash changed.
//!
//! The collaborators it drives are traits ([`CompileBackend`],
//! [`LocalServer`], [`StaticFileServer`], [`TriggerSource`]), with
//! production implementations alongside:
//!
//! - [`CommandBackend`] - compiles by running a shell command
//! - [`ProcessServer`] - a compile server run as a child process
//! - [`PreviewServer`] - serves the published output over HTTP
//! - [`StdinTrigger`] - rebuild when Enter is pressed
//!
//! # Architecture
//!
//! ```text
//!  DebouncedBatcher(s) ─┐
//!  StdinTrigger ────────┼─► RebuildOrchestrator ─► compile_host ─► ConnectionProber
//!                       │          │                                  (cached)
//!                       │          ▼
//!                       │   CompileBackend::compile
//!                       │          │
//!                       │          ▼
//!                       └── Deployer::publish ─► <sketch>/fastled_js ─► PreviewServer
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod backend;
pub mod command;
pub mod deploy;
pub mod error;
pub mod orchestrator;
pub mod preview;
pub mod resolve;
pub mod server;
pub mod trigger;

pub use backend::{CompileBackend, LocalServer, PreviewHandle, StaticFileServer, TriggerSource};
pub use command::{CommandBackend, HASH_FILE, archive_directory};
pub use deploy::{DeployOutcome, Deployer, ERROR_PAGE, render_error_page};
pub use error::LiveError;
pub use orchestrator::{Phase, RebuildOrchestrator, RunReport, StopReason};
pub use preview::{FIRST_PREVIEW_PORT, PreviewServer};
pub use resolve::{ResolvedBackend, compile_host, resolve_backend};
pub use server::{DEFAULT_STARTUP_TIMEOUT, ProcessServer};
pub use trigger::{NeverTrigger, StdinTrigger};
