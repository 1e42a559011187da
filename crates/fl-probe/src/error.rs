//! Error types for the fl-probe crate.

/// Errors raised while probing compile backends.
///
/// Health check failures on a single candidate are transient: the prober
/// records them as `success = false` and moves on. Only building the HTTP
/// transport can fail in a way callers see.
///
/// # Examples
///
/// ```
/// use fl_probe::ProbeError;
///
/// let err = ProbeError::WorkerFailed("task cancelled".to_owned());
/// assert!(err.is_recoverable());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// A health check request failed before a status was received.
    #[error("health check against {url} failed: {source}")]
    Request {
        /// The health endpoint that was requested.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// A health check did not finish within its deadline.
    #[error("health check against {url} timed out")]
    Timeout {
        /// The health endpoint that was requested.
        url: String,
    },

    /// A probe worker panicked or was cancelled.
    #[error("probe worker failed: {0}")]
    WorkerFailed(String),
}

impl ProbeError {
    /// Creates a new [`ProbeError::Request`] error.
    #[inline]
    pub fn request(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Request {
            url: url.into(),
            source,
        }
    }

    /// Creates a new [`ProbeError::Timeout`] error.
    #[inline]
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Returns `true` if probing other candidates can continue.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Client(_))
    }

    /// Returns `true` if the prober cannot be used at all.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_recoverable() {
        let err = ProbeError::timeout("http://localhost:9021/healthz");
        assert!(err.is_recoverable());
        assert!(!err.is_fatal());
        assert_eq!(
            err.to_string(),
            "health check against http://localhost:9021/healthz timed out"
        );
    }

    #[test]
    fn test_worker_failed_display() {
        let err = ProbeError::WorkerFailed("panicked".to_owned());
        assert!(err.to_string().contains("panicked"));
    }
}
