//! Client address resolution from HTTP headers with trust validation
//!
//! The resolved address is only ever fed into the digest; it is never
//! stored or logged. Resolution order depends on [`TrustedProxyMode`]:
//! - `Cloudflare`: `CF-Connecting-IP`, then the `Standard` chain
//! - `Standard`: `X-Forwarded-For`, then `X-Real-IP`, then the socket peer
//! - `None`: the socket peer only
//!
//! When nothing yields an address the client's advisory `ip` field is used,
//! and failing that the literal `"unknown"`.

use axum::http::HeaderMap;
use std::net::IpAddr;
use tracing::debug;

use crate::config::{AnalyticsConfig, TrustedProxyMode};

/// Placeholder hashed when no address can be determined
pub const UNKNOWN_ADDRESS: &str = "unknown";

/// Resolve the address that identifies the caller for digesting
///
/// # Arguments
/// * `headers` - HTTP request headers
/// * `socket_addr` - The socket remote address, when the transport exposes it
/// * `advisory` - The `ip` field from the client payload
/// * `config` - Analytics configuration with trust settings
pub fn resolve_client_address(
    headers: &HeaderMap,
    socket_addr: Option<IpAddr>,
    advisory: Option<&str>,
    config: &AnalyticsConfig,
) -> String {
    let from_headers = match config.trusted_proxy_mode {
        TrustedProxyMode::Cloudflare => {
            extract_cloudflare_ip(headers).or_else(|| extract_standard_ip(headers, config))
        }
        TrustedProxyMode::Standard => extract_standard_ip(headers, config),
        TrustedProxyMode::None => None,
    };

    if let Some(ip) = from_headers.or(socket_addr) {
        return ip.to_string();
    }

    match advisory.map(str::trim).filter(|s| !s.is_empty()) {
        Some(ip) => {
            debug!("No transport address available, using client-reported address");
            ip.to_string()
        }
        None => UNKNOWN_ADDRESS.to_string(),
    }
}

/// Extract IP from Cloudflare-specific header
fn extract_cloudflare_ip(headers: &HeaderMap) -> Option<IpAddr> {
    header_ip(headers, "cf-connecting-ip")
}

/// `X-Forwarded-For` with trust validation, then `X-Real-IP`
fn extract_standard_ip(headers: &HeaderMap, config: &AnalyticsConfig) -> Option<IpAddr> {
    extract_from_x_forwarded_for(headers, config).or_else(|| header_ip(headers, "x-real-ip"))
}

fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

/// Parse X-Forwarded-For header with right-to-left trust validation
fn extract_from_x_forwarded_for(headers: &HeaderMap, config: &AnalyticsConfig) -> Option<IpAddr> {
    let ips: Vec<IpAddr> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|s| s.trim().parse::<IpAddr>().ok())
        .collect();

    if ips.is_empty() {
        return None;
    }

    // A fixed number of trusted hops: skip that many from the right
    if let Some(num_trusted) = config.num_trusted_proxies {
        if ips.len() > num_trusted {
            return Some(ips[ips.len() - num_trusted - 1]);
        }
        // Not enough IPs in chain, return the leftmost (least trusted)
        return ips.first().copied();
    }

    // Trusted CIDRs: the first hop from the right outside every trusted range
    if !config.trusted_proxies.is_empty() {
        return ips
            .iter()
            .rev()
            .find(|ip| !config.trusted_proxies.iter().any(|net| net.contains(*ip)))
            .or_else(|| ips.first())
            .copied();
    }

    // No trust configuration, return the rightmost IP
    ips.last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn create_config(mode: TrustedProxyMode) -> AnalyticsConfig {
        AnalyticsConfig {
            trusted_proxy_mode: mode,
            ..AnalyticsConfig::default()
        }
    }

    fn socket() -> Option<IpAddr> {
        Some("192.168.1.1".parse().unwrap())
    }

    #[test]
    fn test_none_mode_ignores_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.1"));
        let config = create_config(TrustedProxyMode::None);

        let result = resolve_client_address(&headers, socket(), None, &config);
        assert_eq!(result, "192.168.1.1");
    }

    #[test]
    fn test_cloudflare_header_preferred() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("203.0.113.1"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.1"));
        let config = create_config(TrustedProxyMode::Cloudflare);

        let result = resolve_client_address(&headers, socket(), None, &config);
        assert_eq!(result, "203.0.113.1");
    }

    #[test]
    fn test_x_forwarded_for_rightmost_without_trust_config() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 198.51.100.1"),
        );
        let config = create_config(TrustedProxyMode::Standard);

        let result = resolve_client_address(&headers, socket(), None, &config);
        assert_eq!(result, "198.51.100.1");
    }

    #[test]
    fn test_x_forwarded_for_skips_trusted_hops() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 198.51.100.1, 10.0.0.2"),
        );
        let mut config = create_config(TrustedProxyMode::Standard);
        config.num_trusted_proxies = Some(1);

        let result = resolve_client_address(&headers, socket(), None, &config);
        assert_eq!(result, "198.51.100.1");
    }

    #[test]
    fn test_x_forwarded_for_skips_trusted_cidrs() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 10.0.0.9, 10.0.0.2"),
        );
        let mut config = create_config(TrustedProxyMode::Standard);
        config.trusted_proxies = vec!["10.0.0.0/8".parse().unwrap()];

        let result = resolve_client_address(&headers, socket(), None, &config);
        assert_eq!(result, "203.0.113.1");
    }

    #[test]
    fn test_x_real_ip_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("2001:db8::7"));
        let config = create_config(TrustedProxyMode::Standard);

        let result = resolve_client_address(&headers, socket(), None, &config);
        assert_eq!(result, "2001:db8::7");
    }

    #[test]
    fn test_advisory_then_unknown() {
        let headers = HeaderMap::new();
        let config = create_config(TrustedProxyMode::Standard);

        assert_eq!(
            resolve_client_address(&headers, None, Some("198.51.100.20"), &config),
            "198.51.100.20"
        );
        assert_eq!(
            resolve_client_address(&headers, None, Some("  "), &config),
            UNKNOWN_ADDRESS
        );
        assert_eq!(
            resolve_client_address(&headers, None, None, &config),
            UNKNOWN_ADDRESS
        );
    }
}
