//! Health check transport.
//!
//! The prober talks to backends only through [`HealthCheck`], so tests can
//! substitute a scripted transport and count requests.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::ProbeError;

/// Path appended to a backend URL to check its health.
pub const HEALTH_PATH: &str = "/healthz";

/// Checks whether a backend is reachable.
#[async_trait]
pub trait HealthCheck: Send + Sync + 'static {
    /// Returns `Ok(true)` if `url` answered healthy over the requested
    /// address family.
    ///
    /// `url` is a normalised base URL (scheme included, no trailing slash).
    async fn check(&self, url: &str, ipv4: bool) -> Result<bool, ProbeError>;
}

/// Production transport: `GET <url>/healthz`, success on HTTP 200.
///
/// Two clients are kept, one bound to `0.0.0.0` and one to `::`, which
/// forces the connection onto IPv4 or IPv6 respectively. Redirects are
/// followed.
#[derive(Debug, Clone)]
pub struct HttpHealthCheck {
    v4: reqwest::Client,
    v6: reqwest::Client,
}

impl HttpHealthCheck {
    /// Builds both clients with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        Ok(Self {
            v4: build_client(IpAddr::V4(Ipv4Addr::UNSPECIFIED), timeout)?,
            v6: build_client(IpAddr::V6(Ipv6Addr::UNSPECIFIED), timeout)?,
        })
    }
}

fn build_client(local: IpAddr, timeout: Duration) -> Result<reqwest::Client, ProbeError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .local_address(local)
        .build()
        .map_err(ProbeError::Client)
}

#[async_trait]
impl HealthCheck for HttpHealthCheck {
    async fn check(&self, url: &str, ipv4: bool) -> Result<bool, ProbeError> {
        let client = if ipv4 { &self.v4 } else { &self.v6 };
        let endpoint = format!("{url}{HEALTH_PATH}");
        let response = client
            .get(&endpoint)
            .send()
            .await
            .map_err(|source| ProbeError::request(&endpoint, source))?;

        tracing::trace!(url = %endpoint, status = %response.status(), "Health check response");
        Ok(response.status() == StatusCode::OK)
    }
}
