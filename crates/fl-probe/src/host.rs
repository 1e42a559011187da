//! Host string normalisation.
//!
//! Users name backends loosely (`localhost`, `example.com`,
//! `https://host:9021`). These helpers turn that into full URLs:
//!
//! - loopback hosts get `http://`, everything else `https://`
//! - an already-schemed host is left alone
//! - a host without a port is also tried on the compile server port

/// Substrings that mark a host as running on this machine.
pub const LOOPBACK_MARKERS: [&str; 3] = ["localhost", "127.0.0.1", "0.0.0.0"];

/// Returns `true` if `host` refers to this machine.
///
/// # Examples
///
/// ```
/// use fl_probe::is_loopback;
///
/// assert!(is_loopback("http://localhost:9021"));
/// assert!(is_loopback("127.0.0.1"));
/// assert!(!is_loopback("fastled.onrender.com"));
/// ```
#[must_use]
pub fn is_loopback(host: &str) -> bool {
    LOOPBACK_MARKERS.iter().any(|marker| host.contains(marker))
}

/// Prefixes `host` with a scheme if it has none.
///
/// # Examples
///
/// ```
/// use fl_probe::normalize_host;
///
/// assert_eq!(normalize_host("localhost:9021"), "http://localhost:9021");
/// assert_eq!(normalize_host("example.com"), "https://example.com");
/// assert_eq!(normalize_host("http://example.com/"), "http://example.com");
/// ```
#[must_use]
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if has_scheme(host) {
        host.to_owned()
    } else if is_loopback(host) {
        format!("http://{host}")
    } else {
        format!("https://{host}")
    }
}

/// Returns the URLs worth probing for a user-supplied host.
///
/// The normalised host comes first; when it carries no port, the same host
/// on `fallback_port` follows.
///
/// # Examples
///
/// ```
/// use fl_probe::candidate_urls;
///
/// assert_eq!(
///     candidate_urls("localhost", 9021),
///     vec!["http://localhost", "http://localhost:9021"],
/// );
/// assert_eq!(candidate_urls("localhost:80", 9021), vec!["http://localhost:80"]);
/// ```
#[must_use]
pub fn candidate_urls(host: &str, fallback_port: u16) -> Vec<String> {
    let url = normalize_host(host);
    if has_port(&url) {
        return vec![url];
    }

    let (scheme, rest) = url.split_once("://").unwrap_or(("", url.as_str()));
    let (authority, path) = rest.find('/').map_or((rest, ""), |i| rest.split_at(i));
    let with_port = format!("{scheme}://{authority}:{fallback_port}{path}");
    vec![url, with_port]
}

fn has_scheme(host: &str) -> bool {
    host.starts_with("http://") || host.starts_with("https://")
}

fn has_port(url: &str) -> bool {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split('/').next().unwrap_or(rest);
    // Bracketed IPv6 literals contain colons of their own.
    let after_host = match authority.rfind(']') {
        Some(end) => &authority[end + 1..],
        None => authority,
    };
    after_host
        .rsplit_once(':')
        .is_some_and(|(_, port)| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_loopback_uses_http() {
        assert_eq!(normalize_host("localhost"), "http://localhost");
        assert_eq!(normalize_host("127.0.0.1:9021"), "http://127.0.0.1:9021");
        assert_eq!(normalize_host("0.0.0.0"), "http://0.0.0.0");
    }

    #[test]
    fn test_normalize_remote_uses_https() {
        assert_eq!(normalize_host("fastled.onrender.com"), "https://fastled.onrender.com");
        assert_eq!(normalize_host("  example.com/ "), "https://example.com");
    }

    #[test]
    fn test_normalize_keeps_existing_scheme() {
        assert_eq!(normalize_host("http://example.com"), "http://example.com");
        assert_eq!(normalize_host("https://localhost:9021"), "https://localhost:9021");
    }

    #[test]
    fn test_normalize_does_not_mistake_http_prefixed_hostnames() {
        assert_eq!(normalize_host("httpbin.org"), "https://httpbin.org");
    }

    #[test]
    fn test_candidate_urls_adds_fallback_port() {
        assert_eq!(
            candidate_urls("example.com", 9021),
            vec!["https://example.com", "https://example.com:9021"]
        );
        assert_eq!(
            candidate_urls("https://example.com/api", 9021),
            vec!["https://example.com/api", "https://example.com:9021/api"]
        );
    }

    #[test]
    fn test_candidate_urls_respects_explicit_port() {
        assert_eq!(
            candidate_urls("http://localhost:9021", 9021),
            vec!["http://localhost:9021"]
        );
        assert_eq!(candidate_urls("[::1]:8080", 9021), vec!["https://[::1]:8080"]);
    }

    #[test]
    fn test_ipv6_literal_without_port() {
        assert_eq!(
            candidate_urls("https://[::1]", 9021),
            vec!["https://[::1]", "https://[::1]:9021"]
        );
    }
}
