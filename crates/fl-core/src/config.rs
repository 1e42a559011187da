//! Configuration structures for the fled rebuild loop.
//!
//! - [`WatchConfig`] - File watcher and batch debounce settings
//! - [`ProbeConfig`] - Backend discovery settings (TTL, worker pool, hosts)
//! - [`LiveConfig`] - Rebuild loop settings (build mode, preview server)
//! - [`Config`] - Root configuration combining all settings
//!
//! All configuration types implement [`Default`] and deserialize with
//! `#[serde(default)]`, so a config file only needs the keys it overrides.

use std::time::Duration;

use camino::{Utf8Component, Utf8Path};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::BuildMode;

/// Default public compile backend.
pub const DEFAULT_HOST: &str = "https://fastled.onrender.com";

/// Port a compile server listens on when a host is given without one.
pub const DEFAULT_SERVER_PORT: u16 = 9021;

/// Name of the directory, inside the sketch, that build output is published to.
pub const DEFAULT_SERVING_DIR: &str = "fastled_js";

/// Configuration for file watching and change batching.
///
/// # Examples
///
/// ```
/// use fl_core::WatchConfig;
///
/// let config = WatchConfig::default();
/// assert_eq!(config.debounce_ms, 2000);
/// assert_eq!(config.path_debounce_ms, 1000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period after the last change before a batch is flushed.
    pub debounce_ms: u64,

    /// Repeats of the same path within this window are dropped by the watcher.
    ///
    /// Must not exceed `debounce_ms`, so a dropped repeat always falls inside
    /// a batch that has not been flushed yet.
    pub path_debounce_ms: u64,

    /// Capacity of the channel between the watcher worker and its consumer.
    pub channel_capacity: usize,

    /// Path components that are never watched (matched exactly).
    pub excluded: Vec<String>,
}

impl WatchConfig {
    /// Returns the batch debounce window.
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Returns the per-path debounce window.
    #[must_use]
    pub const fn path_debounce(&self) -> Duration {
        Duration::from_millis(self.path_debounce_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 2000,
            path_debounce_ms: 1000,
            channel_capacity: 100,
            excluded: vec![DEFAULT_SERVING_DIR.to_owned()],
        }
    }
}

/// Configuration for backend discovery.
///
/// # Examples
///
/// ```
/// use fl_core::ProbeConfig;
///
/// let config = ProbeConfig::default();
/// assert_eq!(config.workers, 8);
/// assert_eq!(config.ttl_secs, 3600);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// How long a probe outcome (including "all failed") is reused.
    pub ttl_secs: u64,

    /// Maximum number of health checks in flight at once.
    pub workers: usize,

    /// Per-request health check timeout.
    pub timeout_ms: u64,

    /// Whether non-loopback candidates are also tried over IPv6.
    pub use_ipv6: bool,

    /// Host used when no candidate answers.
    pub default_host: String,

    /// Port appended to a candidate host that has none.
    pub fallback_port: u16,
}

impl ProbeConfig {
    /// Returns the cache time-to-live.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 60 * 60,
            workers: 8,
            timeout_ms: 3000,
            use_ipv6: true,
            default_host: DEFAULT_HOST.to_owned(),
            fallback_port: DEFAULT_SERVER_PORT,
        }
    }
}

/// How the static preview server should pick its port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreviewPort {
    /// No preview server.
    Disabled,
    /// First free port from the default range.
    Auto,
    /// Exactly this port.
    Fixed(u16),
}

/// Configuration for the rebuild loop.
///
/// # Examples
///
/// ```
/// use fl_core::{BuildMode, LiveConfig, PreviewPort};
///
/// let config = LiveConfig::default();
/// assert_eq!(config.build_mode, BuildMode::Quick);
/// assert_eq!(config.preview_port(), PreviewPort::Auto);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Optimisation level requested from the backend.
    pub build_mode: BuildMode,

    /// Whether the backend should emit profiling output.
    pub profile: bool,

    /// Whether the preview server opens a browser tab.
    pub open_browser: bool,

    /// Keep watching after the initial compile.
    pub keep_running: bool,

    /// Preview server port: unset = auto, negative = disabled.
    pub preview_port: Option<i32>,

    /// Upper bound on each trigger poll; sets the loop cadence.
    pub poll_interval_ms: u64,

    /// Directory name, inside the sketch, that output is published to.
    pub serving_dir: String,
}

impl LiveConfig {
    /// Returns the loop poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Interprets [`preview_port`](Self::preview_port).
    ///
    /// Values above `u16::MAX` are rejected by [`Config::validate`]; here
    /// they fall back to [`PreviewPort::Auto`].
    #[must_use]
    pub fn preview_port(&self) -> PreviewPort {
        match self.preview_port {
            None => PreviewPort::Auto,
            Some(port) if port < 0 => PreviewPort::Disabled,
            Some(port) => u16::try_from(port).map_or(PreviewPort::Auto, PreviewPort::Fixed),
        }
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            build_mode: BuildMode::Quick,
            profile: false,
            open_browser: true,
            keep_running: true,
            preview_port: None,
            poll_interval_ms: 1000,
            serving_dir: DEFAULT_SERVING_DIR.to_owned(),
        }
    }
}

/// Root configuration.
///
/// # Examples
///
/// ```
/// use fl_core::Config;
///
/// let config = Config::default();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// File watcher configuration.
    pub watch: WatchConfig,

    /// Backend discovery configuration.
    pub probe: ProbeConfig,

    /// Rebuild loop configuration.
    pub live: LiveConfig,
}

impl Config {
    /// Loads and validates a JSON configuration file.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch.debounce_ms == 0 {
            return Err(ConfigError::invalid_option(
                "watch.debounce_ms",
                "must be greater than zero",
            ));
        }
        if self.watch.path_debounce_ms > self.watch.debounce_ms {
            return Err(ConfigError::invalid_option(
                "watch.path_debounce_ms",
                format!(
                    "must not exceed watch.debounce_ms ({} > {})",
                    self.watch.path_debounce_ms, self.watch.debounce_ms
                ),
            ));
        }
        if self.watch.channel_capacity == 0 {
            return Err(ConfigError::invalid_option(
                "watch.channel_capacity",
                "must be at least 1",
            ));
        }
        if self.probe.workers == 0 {
            return Err(ConfigError::invalid_option("probe.workers", "must be at least 1"));
        }
        if self.probe.timeout_ms == 0 {
            return Err(ConfigError::invalid_option(
                "probe.timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.live.poll_interval_ms == 0 {
            return Err(ConfigError::invalid_option(
                "live.poll_interval_ms",
                "must be greater than zero",
            ));
        }
        if let Some(port) = self.live.preview_port {
            if port > i32::from(u16::MAX) {
                return Err(ConfigError::invalid_option(
                    "live.preview_port",
                    format!("{port} is not a valid port"),
                ));
            }
        }
        validate_dir_name("live.serving_dir", &self.live.serving_dir)
    }
}

/// Checks that `name` is one plain directory name, so joining it onto a
/// directory stays strictly inside that directory.
///
/// `.`, `..`, roots, prefixes and anything with a separator are rejected.
///
/// # Examples
///
/// ```
/// use fl_core::config::validate_dir_name;
///
/// assert!(validate_dir_name("live.serving_dir", "fastled_js").is_ok());
/// assert!(validate_dir_name("live.serving_dir", ".").is_err());
/// assert!(validate_dir_name("live.serving_dir", "..").is_err());
/// ```
pub fn validate_dir_name(option: &str, name: &str) -> Result<(), ConfigError> {
    let mut components = Utf8Path::new(name).components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(Utf8Component::Normal(_)), None)
    );
    if !single_normal || name.contains(['/', '\\']) {
        return Err(ConfigError::invalid_option(
            option,
            format!("'{name}' must be a single directory name"),
        ));
    }
    Ok(())
}
