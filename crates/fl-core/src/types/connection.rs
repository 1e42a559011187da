//! Health check outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The outcome of one health check against one candidate host.
///
/// `host` is the normalised URL that was checked (scheme included), so it
/// can be used directly as a compile endpoint base.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionResult {
    /// Normalised URL of the checked host.
    pub host: String,

    /// Whether the host answered its health check with HTTP 200.
    pub success: bool,

    /// Whether the check was pinned to IPv4.
    pub used_ipv4: bool,
}

impl ConnectionResult {
    /// Creates a new connection result.
    #[must_use]
    pub fn new(host: impl Into<String>, success: bool, used_ipv4: bool) -> Self {
        Self {
            host: host.into(),
            success,
            used_ipv4,
        }
    }

    /// Returns `"IPv4"` or `"IPv6"` for log output.
    #[must_use]
    pub const fn family(&self) -> &'static str {
        if self.used_ipv4 { "IPv4" } else { "IPv6" }
    }
}

impl fmt::Display for ConnectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.success { "ok" } else { "failed" };
        write!(f, "{} via {} ({status})", self.host, self.family())
    }
}
