//! Concurrent backend discovery for the fled rebuild loop.
//!
//! Given a handful of candidate hosts, [`ConnectionProber`] fires health
//! checks at all of them (IPv4, and IPv6 for remote hosts) through a bounded
//! worker pool and returns the first one that answers. Outcomes are cached
//! for an hour, so re-resolving a backend before every compile is cheap.
//!
//! - [`host`] - URL normalisation and candidate expansion
//! - [`health`] - the [`HealthCheck`] transport seam and its reqwest implementation
//! - [`cache`] - TTL cache keyed by the sorted candidate list
//! - [`prober`] - the racing prober itself
//!
//! # Usage
//!
//! ```no_run
//! use fl_core::ProbeConfig;
//! use fl_probe::ConnectionProber;
//!
//! # async fn example() -> Result<(), fl_probe::ProbeError> {
//! let prober = ConnectionProber::http(&ProbeConfig::default())?;
//! let host = prober
//!     .find_host("localhost")
//!     .await
//!     .map_or_else(|| prober.default_host().to_owned(), |found| found.host);
//! println!("compiling against {host}");
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod cache;
pub mod error;
pub mod health;
pub mod host;
pub mod prober;

pub use cache::{CacheKey, CachedProbe, ConnectionCache};
pub use error::ProbeError;
pub use health::{HEALTH_PATH, HealthCheck, HttpHealthCheck};
pub use host::{LOOPBACK_MARKERS, candidate_urls, is_loopback, normalize_host};
pub use prober::ConnectionProber;
