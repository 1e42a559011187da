//! Domain types shared by the watcher, prober, and rebuild loop.
//!
//! - [`BuildMode`] - compiler optimisation level requested from a backend
//! - [`CompileResult`] - what a backend returns for one compile call
//! - [`ConnectionResult`] - outcome of one backend health check

mod build;
mod compile;
mod connection;

pub use build::BuildMode;
pub use compile::CompileResult;
pub use connection::ConnectionResult;
