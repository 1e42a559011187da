//! Concurrent backend discovery.
//!
//! ```text
//!  hosts ──► normalise ──► one task per (host, family) ──► JoinSet
//!                                   │  Semaphore(workers)
//!                                   ▼
//!                        HealthCheck::check (timeout)
//!                                   │
//!            completion order ◄─────┘
//!                 │
//!                 ├─ first success (or first result when not filtering)
//!                 └─ abort the rest, cache the outcome for the TTL
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use fl_core::{ConnectionResult, ProbeConfig, SharedClock, SystemClock};

use crate::cache::{CacheKey, ConnectionCache};
use crate::error::ProbeError;
use crate::health::{HealthCheck, HttpHealthCheck};
use crate::host::{candidate_urls, is_loopback, normalize_host};

/// Races health checks across candidate hosts and caches the winner.
///
/// The worker pool is shared by every probe made through one prober, so
/// concurrent callers never exceed `workers` requests in flight.
///
/// # Examples
///
/// ```no_run
/// use fl_core::ProbeConfig;
/// use fl_probe::ConnectionProber;
///
/// # async fn example() -> Result<(), fl_probe::ProbeError> {
/// let prober = ConnectionProber::http(&ProbeConfig::default())?;
/// let hosts = ["http://localhost:9021", "https://fastled.onrender.com"];
///
/// match prober.probe(&hosts, true, true).await {
///     Some(found) => println!("using {found}"),
///     None => println!("no backend answered"),
/// }
/// # Ok(())
/// # }
/// ```
pub struct ConnectionProber {
    transport: Arc<dyn HealthCheck>,
    workers: Arc<Semaphore>,
    cache: ConnectionCache,
    timeout: Duration,
    use_ipv6: bool,
    default_host: String,
    fallback_port: u16,
}

impl std::fmt::Debug for ConnectionProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProber")
            .field("workers", &self.workers.available_permits())
            .field("cached", &self.cache.len())
            .field("timeout", &self.timeout)
            .field("default_host", &self.default_host)
            .finish_non_exhaustive()
    }
}

impl ConnectionProber {
    /// Creates a prober over the reqwest transport.
    pub fn http(config: &ProbeConfig) -> Result<Self, ProbeError> {
        let transport = HttpHealthCheck::new(config.timeout())?;
        Ok(Self::new(Arc::new(transport), config))
    }

    /// Creates a prober over an arbitrary transport.
    #[must_use]
    pub fn new(transport: Arc<dyn HealthCheck>, config: &ProbeConfig) -> Self {
        Self::with_clock(transport, config, SystemClock::shared())
    }

    /// Creates a prober whose cache reads time from `clock`.
    #[must_use]
    pub fn with_clock(
        transport: Arc<dyn HealthCheck>,
        config: &ProbeConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            transport,
            workers: Arc::new(Semaphore::new(config.workers.max(1))),
            cache: ConnectionCache::new(config.ttl(), clock),
            timeout: config.timeout(),
            use_ipv6: config.use_ipv6,
            default_host: normalize_host(&config.default_host),
            fallback_port: config.fallback_port,
        }
    }

    /// Probes `hosts` and returns the first acceptable result.
    ///
    /// Every candidate gets an IPv4 check; with `use_ipv6`, non-loopback
    /// candidates also get an IPv6 check. Results are consumed in completion
    /// order. With `filter_out_bad`, the first success wins and `None` means
    /// every check failed; without it, the first completed check wins
    /// whatever its outcome. The outcome, `None` included, is cached.
    pub async fn probe<S: AsRef<str>>(
        &self,
        hosts: &[S],
        filter_out_bad: bool,
        use_ipv6: bool,
    ) -> Option<ConnectionResult> {
        let key = CacheKey::new(hosts, filter_out_bad, use_ipv6);
        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!(?cached, "Probe cache hit");
            return cached;
        }

        let mut tasks = JoinSet::new();
        for host in hosts {
            let url = normalize_host(host.as_ref());
            self.spawn_check(&mut tasks, url.clone(), true);
            if use_ipv6 && !is_loopback(&url) {
                self.spawn_check(&mut tasks, url, false);
            }
        }

        let mut found = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(error) => {
                    let error = ProbeError::WorkerFailed(error.to_string());
                    tracing::warn!(error = %error, "Health check task failed");
                    continue;
                }
            };
            tracing::debug!(result = %outcome, "Health check finished");
            if outcome.success || !filter_out_bad {
                found = Some(outcome);
                break;
            }
        }
        tasks.abort_all();

        if found.is_none() {
            tracing::warn!(candidates = hosts.len(), "No backend answered its health check");
        }
        self.cache.insert(key, found.clone());
        found
    }

    /// Looks for a healthy backend behind one user-supplied host.
    ///
    /// Tries the host as given and, when it has no port, on the fallback
    /// compile server port.
    pub async fn find_host(&self, host: &str) -> Option<ConnectionResult> {
        let candidates = candidate_urls(host, self.fallback_port);
        self.probe(candidates.as_slice(), true, self.use_ipv6).await
    }

    /// Returns the host used when nothing else answers.
    #[inline]
    #[must_use]
    pub fn default_host(&self) -> &str {
        &self.default_host
    }

    /// Returns the configured IPv6 preference.
    #[inline]
    #[must_use]
    pub const fn use_ipv6(&self) -> bool {
        self.use_ipv6
    }

    /// Drops every cached outcome.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    fn spawn_check(&self, tasks: &mut JoinSet<ConnectionResult>, url: String, ipv4: bool) {
        let transport = Arc::clone(&self.transport);
        let workers = Arc::clone(&self.workers);
        let timeout = self.timeout;

        tasks.spawn(async move {
            // The semaphore is never closed.
            let _permit = workers.acquire_owned().await.ok();

            let checked = match tokio::time::timeout(timeout, transport.check(&url, ipv4)).await {
                Ok(result) => result,
                Err(_elapsed) => Err(ProbeError::timeout(&url)),
            };
            let success = match checked {
                Ok(healthy) => healthy,
                Err(error) if error.is_fatal() => {
                    tracing::warn!(error = %error, "Health check transport unusable");
                    false
                }
                Err(error) => {
                    tracing::debug!(error = %error, "Health check failed");
                    false
                }
            };
            ConnectionResult::new(url, success, ipv4)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fl_core::{FxHashMap, FxHashSet, ManualClock};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted transport: listed URLs are healthy, optional per-URL delays,
    /// counts every request and the peak number in flight.
    #[derive(Debug, Default)]
    struct MockHealth {
        healthy: FxHashSet<String>,
        delays: FxHashMap<String, Duration>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl MockHealth {
        fn healthy(urls: &[&str]) -> Self {
            Self {
                healthy: urls.iter().map(|u| (*u).to_owned()).collect(),
                ..Self::default()
            }
        }

        fn delay(mut self, url: &str, by: Duration) -> Self {
            self.delays.insert(url.to_owned(), by);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HealthCheck for MockHealth {
        async fn check(&self, url: &str, _ipv4: bool) -> Result<bool, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let delay = self
                .delays
                .get(url)
                .copied()
                .unwrap_or(Duration::from_millis(10));
            tokio::time::sleep(delay).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(self.healthy.contains(url))
        }
    }

    fn prober(mock: &Arc<MockHealth>) -> ConnectionProber {
        let transport: Arc<dyn HealthCheck> = Arc::clone(mock) as Arc<dyn HealthCheck>;
        ConnectionProber::new(transport, &ProbeConfig::default())
    }

    #[tokio::test]
    async fn test_success_wins_regardless_of_order() {
        for hosts in [["bad.example", "good.example"], ["good.example", "bad.example"]] {
            let mock = Arc::new(MockHealth::healthy(&["https://good.example"]));
            let prober = prober(&mock);

            let found = prober.probe(&hosts, true, true).await.expect("a healthy host");
            assert_eq!(found.host, "https://good.example");
            assert!(found.success);
        }
    }

    #[tokio::test]
    async fn test_slow_failure_does_not_block_fast_success() {
        let mock = Arc::new(
            MockHealth::healthy(&["https://fast.example"])
                .delay("https://slow.example", Duration::from_secs(2)),
        );
        let prober = prober(&mock);

        let start = std::time::Instant::now();
        let found = prober
            .probe(&["slow.example", "fast.example"], true, false)
            .await
            .expect("fast host");
        assert_eq!(found.host, "https://fast.example");
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_repeated_probe_within_ttl_makes_no_requests() {
        let mock = Arc::new(MockHealth::healthy(&["https://example.com"]));
        let prober = prober(&mock);
        let hosts = ["example.com", "other.example"];

        let first = prober.probe(&hosts, true, true).await;
        let calls = mock.calls();
        assert!(calls > 0);

        let reversed = ["other.example", "example.com"];
        let second = prober.probe(&reversed, true, true).await;
        assert_eq!(first, second);
        assert_eq!(mock.calls(), calls, "cache hit issues zero requests");
    }

    #[tokio::test]
    async fn test_exhaustion_yields_none_and_is_cached() {
        let mock = Arc::new(MockHealth::default());
        let prober = prober(&mock);

        assert_eq!(prober.probe(&["a.example", "b.example"], true, true).await, None);
        assert_eq!(mock.calls(), 4, "IPv4 and IPv6 for each remote candidate");

        assert_eq!(prober.probe(&["a.example", "b.example"], true, true).await, None);
        assert_eq!(mock.calls(), 4);
    }

    #[tokio::test]
    async fn test_unfiltered_probe_always_returns() {
        let mock = Arc::new(MockHealth::default());
        let prober = prober(&mock);

        let found = prober
            .probe(&["down.example"], false, false)
            .await
            .expect("first result regardless of outcome");
        assert!(!found.success);
        assert!(found.used_ipv4);
    }

    #[tokio::test]
    async fn test_loopback_skips_ipv6() {
        let mock = Arc::new(MockHealth::default());
        let prober = prober(&mock);

        assert_eq!(prober.probe(&["localhost:9021"], true, true).await, None);
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_local_down_remote_up() {
        let mock = Arc::new(MockHealth::healthy(&["https://example.com"]));
        let prober = prober(&mock);

        let found = prober
            .probe(&["http://localhost:9021", "https://example.com"], true, true)
            .await
            .expect("remote host");
        assert_eq!(found.host, "https://example.com");
        assert!(found.success);
    }

    #[tokio::test]
    async fn test_ttl_expiry_probes_again() {
        let mock = Arc::new(MockHealth::healthy(&["https://example.com"]));
        let clock = Arc::new(ManualClock::new());
        let transport: Arc<dyn HealthCheck> = Arc::clone(&mock) as Arc<dyn HealthCheck>;
        let prober = ConnectionProber::with_clock(
            transport,
            &ProbeConfig::default(),
            Arc::clone(&clock) as SharedClock,
        );

        prober.probe(&["example.com"], true, false).await;
        prober.probe(&["example.com"], true, false).await;
        assert_eq!(mock.calls(), 1);

        clock.advance(Duration::from_secs(3600));
        prober.probe(&["example.com"], true, false).await;
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_worker_pool_bounds_concurrency() {
        let mock = Arc::new(MockHealth::default());
        let config = ProbeConfig {
            workers: 2,
            ..ProbeConfig::default()
        };
        let transport: Arc<dyn HealthCheck> = Arc::clone(&mock) as Arc<dyn HealthCheck>;
        let prober = ConnectionProber::new(transport, &config);

        let hosts = ["a.example", "b.example", "c.example", "d.example"];
        assert_eq!(prober.probe(&hosts, true, false).await, None);
        assert_eq!(mock.calls(), 4);
        assert!(mock.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let mock = Arc::new(
            MockHealth::healthy(&["https://hung.example"])
                .delay("https://hung.example", Duration::from_secs(10)),
        );
        let config = ProbeConfig {
            timeout_ms: 50,
            ..ProbeConfig::default()
        };
        let transport: Arc<dyn HealthCheck> = Arc::clone(&mock) as Arc<dyn HealthCheck>;
        let prober = ConnectionProber::new(transport, &config);

        assert_eq!(prober.probe(&["hung.example"], true, false).await, None);
    }

    #[tokio::test]
    async fn test_find_host_tries_fallback_port() {
        let mock = Arc::new(MockHealth::healthy(&["http://localhost:9021"]));
        let prober = prober(&mock);

        let found = prober.find_host("localhost").await.expect("fallback port");
        assert_eq!(found.host, "http://localhost:9021");
        assert_eq!(prober.default_host(), "https://fastled.onrender.com");
    }
}
