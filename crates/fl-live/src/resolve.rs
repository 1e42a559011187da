//! Picking the compile backend for a session.

use fl_probe::{ConnectionProber, is_loopback};

use crate::backend::LocalServer;

/// The compile backend a session talks to.
pub enum ResolvedBackend {
    /// A backend we only know by URL. The URL is re-checked through the
    /// prober's cache before every compile.
    Host(String),
    /// A local server this session started and must stop.
    Owned(Box<dyn LocalServer>),
}

impl std::fmt::Debug for ResolvedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host(host) => f.debug_tuple("Host").field(host).finish(),
            Self::Owned(server) => f.debug_tuple("Owned").field(&server.url()).finish(),
        }
    }
}

impl ResolvedBackend {
    /// Returns `true` if the session owns the backend process.
    #[inline]
    #[must_use]
    pub const fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }
}

/// Resolves `requested_host` to a backend.
///
/// A loopback host that does not answer is replaced by `local_server`, when
/// one is supplied and starts. Anything else that does not answer falls back
/// to the prober's default host.
pub async fn resolve_backend(
    prober: &ConnectionProber,
    requested_host: &str,
    local_server: Option<Box<dyn LocalServer>>,
) -> ResolvedBackend {
    if let Some(found) = prober.find_host(requested_host).await {
        tracing::info!(host = %found.host, ipv4 = found.used_ipv4, "Using running backend");
        return ResolvedBackend::Host(found.host);
    }

    if is_loopback(requested_host) {
        if let Some(mut server) = local_server {
            tracing::info!(url = %server.url(), "No local backend answered; starting one");
            match server.start().await {
                Ok(()) => return ResolvedBackend::Owned(server),
                Err(error) => {
                    tracing::warn!(error = %error, "Failed to start local compile server");
                    server.stop().await;
                }
            }
        }
    }

    let fallback = prober.default_host().to_owned();
    tracing::warn!(
        requested = %requested_host,
        fallback = %fallback,
        "Backend unreachable; falling back to default host"
    );
    ResolvedBackend::Host(fallback)
}

/// Returns the URL to send the next compile to.
///
/// `Host` backends go through the prober (cached for the TTL); if the host
/// no longer answers, the default host is used instead.
pub async fn compile_host(prober: &ConnectionProber, backend: &ResolvedBackend) -> String {
    match backend {
        ResolvedBackend::Owned(server) => server.url(),
        ResolvedBackend::Host(host) => match prober.find_host(host).await {
            Some(found) => found.host,
            None => {
                tracing::warn!(host = %host, "Backend did not answer; using default host");
                prober.default_host().to_owned()
            }
        },
    }
}
