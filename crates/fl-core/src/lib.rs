//! Core types, errors, and utilities for the fled rebuild loop.
//!
//! This crate provides the foundational types used across the workspace:
//!
//! - Error types for configuration handling
//! - Configuration structures ([`Config`], [`WatchConfig`], [`ProbeConfig`], [`LiveConfig`])
//! - Domain types ([`BuildMode`], [`CompileResult`], [`ConnectionResult`])
//! - Content hashing ([`ContentHash`]) and `FxHashMap`/`FxHashSet` aliases
//! - An injectable [`Clock`] so time-driven components can be tested
//!   without sleeping

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod error;
pub mod hash;
pub mod types;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{Config, LiveConfig, PreviewPort, ProbeConfig, WatchConfig, validate_dir_name};
pub use error::ConfigError;
pub use hash::{ContentHash, FxHashMap, FxHashSet, content_digest, fx_hash_map};
pub use types::{BuildMode, CompileResult, ConnectionResult};
