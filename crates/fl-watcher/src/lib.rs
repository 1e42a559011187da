//! Content-hash-aware file watching with debounced batching.
//!
//! # Overview
//!
//! The fl-watcher crate turns raw filesystem notifications into the small
//! number of "rebuild now" signals a development loop actually wants:
//!
//! - [`FileWatcher`] hashes modified files and only reports real content
//!   changes, so editors that rewrite identical bytes stay quiet
//! - [`WatcherProcess`] runs a watcher on a blocking worker and relays its
//!   changes through a bounded channel
//! - [`DebouncedBatcher`] coalesces bursts into one sorted, deduplicated
//!   [`ChangeBatch`] after a quiet period
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────── blocking worker ─────────────────────────┐
//! │ notify ──► FileWatcher ──► ChangeTracker (filter, hash, per-path) │
//! └───────────────────────────────────┬───────────────────────────────┘
//!                                     │ bounded mpsc (100)
//!                                     ▼
//!            WatcherProcess ──► DebouncedBatcher ──► rebuild loop
//! ```
//!
//! # Crate Dependencies
//!
//! ```text
//! fl-cli ──► fl-live ──► fl-watcher ──► fl-core
//!                    └─► fl-probe ────►
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use fl_core::WatchConfig;
//! use fl_watcher::{DebouncedBatcher, ExcludeComponentsFilter, WatcherProcess};
//! use camino::Utf8Path;
//!
//! # async fn example() -> Result<(), fl_watcher::WatchError> {
//! let config = WatchConfig::default();
//! let filter = ExcludeComponentsFilter::new(config.excluded.iter().cloned());
//! let process = WatcherProcess::new(Utf8Path::new("./sketch"), &config, filter).await?;
//! let mut batcher = DebouncedBatcher::new(process, config.debounce());
//!
//! let batch = batcher.get_all_changes().await;
//! for path in &batch {
//!     println!("changed: {path}");
//! }
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod debounce;
pub mod error;
pub mod events;
pub mod filter;
pub mod process;
pub mod tracker;
pub mod watcher;

pub use debounce::{ChangeSource, DebounceState, DebouncedBatcher};
pub use error::WatchError;
pub use events::{ChangeBatch, ChangeEvent};
pub use filter::{AcceptAllFilter, ExcludeComponentsFilter, FileFilter};
pub use process::WatcherProcess;
pub use tracker::ChangeTracker;
pub use watcher::FileWatcher;
