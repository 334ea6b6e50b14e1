//! Outbound HTTP helpers shared by the feed fetcher and the image resolver.

use std::net::IpAddr;
use std::time::Duration;

use reqwest::{Client, Response};

use crate::{NewsdeskError, Result};

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// Build an HTTP client with the given user agent and connect timeout.
///
/// Overall request time is bounded by the caller's cancellation token, not
/// by the client.
pub fn build_client(user_agent: &str, connect_timeout: Duration) -> Result<Client> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .user_agent(user_agent)
        .build()
        .map_err(|e| NewsdeskError::Config(format!("failed to create HTTP client: {}", e)))
}

/// Read a response body, failing once it grows past `max_bytes`.
pub async fn read_body_limited(mut response: Response, max_bytes: u64) -> Result<Vec<u8>> {
    if let Some(content_length) = response.content_length() {
        if content_length > max_bytes {
            return Err(NewsdeskError::Network(format!(
                "body too large: {} bytes (max {} bytes)",
                content_length, max_bytes
            )));
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| NewsdeskError::Network(format!("failed to read response: {}", e)))?
    {
        if (body.len() + chunk.len()) as u64 > max_bytes {
            return Err(NewsdeskError::Network(format!(
                "body too large: more than {} bytes",
                max_bytes
            )));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Validate an outbound URL.
///
/// The scheme must be http or https. Unless `allow_private` is set, the host
/// must not be a loopback/private/link-local address or a local hostname.
pub fn validate_url(url: &str, allow_private: bool) -> Result<url::Url> {
    let parsed =
        url::Url::parse(url).map_err(|e| NewsdeskError::Network(format!("invalid URL: {}", e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(NewsdeskError::Network(format!(
                "unsupported URL scheme: {}",
                scheme
            )));
        }
    }

    let host = parsed
        .host()
        .ok_or_else(|| NewsdeskError::Network("URL has no host".to_string()))?;

    if allow_private {
        return Ok(parsed);
    }

    match host {
        url::Host::Domain(domain) => {
            if is_forbidden_hostname(domain) {
                return Err(NewsdeskError::Network(format!("forbidden host: {}", domain)));
            }
        }
        url::Host::Ipv4(ipv4) => {
            let ip = IpAddr::V4(ipv4);
            if is_private_ip(&ip) {
                return Err(NewsdeskError::Network(format!(
                    "private IP address not allowed: {}",
                    ip
                )));
            }
        }
        url::Host::Ipv6(ipv6) => {
            let ip = IpAddr::V6(ipv6);
            if is_private_ip(&ip) {
                return Err(NewsdeskError::Network(format!(
                    "private IP address not allowed: {}",
                    ip
                )));
            }
        }
    }

    Ok(parsed)
}

fn is_forbidden_hostname(host: &str) -> bool {
    let host = host.to_lowercase();
    if host == "localhost" {
        return true;
    }
    [
        ".local",
        ".localhost",
        ".internal",
        ".intranet",
        ".corp",
        ".home",
        ".lan",
    ]
    .iter()
    .any(|suffix| host.ends_with(suffix))
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            let octets = ipv4.octets();
            ipv4.is_loopback()
                || ipv4.is_private()
                || ipv4.is_link_local()
                || ipv4.is_broadcast()
                || ipv4.is_unspecified()
                || ipv4.is_documentation()
                // Carrier-grade NAT: 100.64.0.0/10
                || (octets[0] == 100 && (64..=127).contains(&octets[1]))
        }
        IpAddr::V6(ipv6) => {
            let segments = ipv6.segments();
            ipv6.is_loopback()
                || ipv6.is_unspecified()
                // Unique local: fc00::/7
                || (segments[0] & 0xfe00) == 0xfc00
                // Link-local: fe80::/10
                || (segments[0] & 0xffc0) == 0xfe80
                || ipv6
                    .to_ipv4_mapped()
                    .is_some_and(|v4| is_private_ip(&IpAddr::V4(v4)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url_public_https() {
        let url = validate_url("https://telex.hu/rss", false).unwrap();
        assert_eq!(url.host_str(), Some("telex.hu"));
    }

    #[test]
    fn test_validate_url_invalid_scheme() {
        let err = validate_url("ftp://example.com/feed.xml", false).unwrap_err();
        assert!(err.to_string().contains("unsupported URL scheme"));
    }

    #[test]
    fn test_validate_url_missing_scheme() {
        let err = validate_url("atlatszo.hu/feed/", false).unwrap_err();
        assert!(err.to_string().contains("invalid URL"));
    }

    #[test]
    fn test_validate_url_localhost() {
        let err = validate_url("http://localhost/feed.xml", false).unwrap_err();
        assert!(err.to_string().contains("forbidden host"));
        assert!(validate_url("http://server.local/feed.xml", false).is_err());
        assert!(validate_url("http://api.internal/feed.xml", false).is_err());
    }

    #[test]
    fn test_validate_url_private_ips() {
        for url in [
            "http://127.0.0.1/feed.xml",
            "http://10.0.0.1/feed.xml",
            "http://172.16.0.1/feed.xml",
            "http://192.168.1.1/feed.xml",
            "http://169.254.1.1/feed.xml",
            "http://100.64.0.1/feed.xml",
            "http://[::1]/feed.xml",
            "http://[fd00::1]/feed.xml",
            "http://[::ffff:127.0.0.1]/feed.xml",
        ] {
            let err = validate_url(url, false).unwrap_err();
            assert!(err.to_string().contains("private IP"), "{url}: {err}");
        }
        assert!(validate_url("http://172.32.0.1/feed.xml", false).is_ok());
        assert!(validate_url("http://8.8.8.8/feed.xml", false).is_ok());
    }

    #[test]
    fn test_validate_url_allow_private() {
        assert!(validate_url("http://127.0.0.1:8080/feed.xml", true).is_ok());
        assert!(validate_url("http://localhost/feed.xml", true).is_ok());
        assert!(validate_url("file:///etc/passwd", true).is_err());
    }

    #[test]
    fn test_is_forbidden_hostname() {
        assert!(is_forbidden_hostname("localhost"));
        assert!(is_forbidden_hostname("LOCALHOST"));
        assert!(is_forbidden_hostname("corp.intranet"));
        assert!(!is_forbidden_hostname("localhost.example.com"));
        assert!(!is_forbidden_hostname("444.hu"));
    }
}
