//! Proxy configuration.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ProxyError;

/// HTTPS listen port.
pub const DEFAULT_PORT: u16 = 8443;

/// Plain-HTTP port used when TLS cannot be set up.
pub const DEFAULT_FALLBACK_PORT: u16 = 8082;

/// Model inference can be slow; image calls get a generous budget.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Base URL of the gateway every request is forwarded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    base: String,
}

impl Upstream {
    /// Parse an `http://` or `https://` base URL. Trailing slashes are
    /// dropped; a path component is kept as a mount point.
    pub fn parse(raw: &str) -> Result<Self, ProxyError> {
        let url = reqwest::Url::parse(raw.trim())
            .map_err(|e| ProxyError::InvalidUpstream(format!("{}: {}", raw, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ProxyError::InvalidUpstream(format!(
                "{}: scheme must be http or https",
                raw
            )));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(ProxyError::InvalidUpstream(format!("{}: missing host", raw)));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(ProxyError::InvalidUpstream(format!(
                "{}: query and fragment are not allowed",
                raw
            )));
        }

        Ok(Self {
            base: url.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.base
    }

    /// Absolute upstream URL for a request path (and optional query).
    pub fn join(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base, path_and_query)
    }
}

/// Forwarding behaviour shared by every request.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub upstream: Upstream,
    pub request_timeout: Duration,
    pub health_timeout: Duration,
}

impl ProxyConfig {
    pub fn new(upstream: Upstream) -> Self {
        Self {
            upstream,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }
}

/// Whether the listener terminates TLS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum TlsMode {
    /// Serve HTTPS, generating a self-signed certificate if none exists.
    /// Falls back to plain HTTP on the fallback port if TLS setup fails.
    #[default]
    Auto,
    /// Serve plain HTTP on the main port.
    Off,
}

/// Where and how the proxy listens.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub fallback_port: u16,
    pub tls: TlsMode,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            fallback_port: DEFAULT_FALLBACK_PORT,
            tls: TlsMode::Auto,
            cert_path: PathBuf::from("cert.pem"),
            key_path: PathBuf::from("key.pem"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_normalization() {
        let upstream = Upstream::parse("http://localhost:8081/").unwrap();
        assert_eq!(upstream.as_str(), "http://localhost:8081");
        assert_eq!(
            upstream.join("/remove-bg"),
            "http://localhost:8081/remove-bg"
        );

        let mounted = Upstream::parse("https://example.com/rembg/").unwrap();
        assert_eq!(
            mounted.join("/api/remove-bg"),
            "https://example.com/rembg/api/remove-bg"
        );
    }

    #[test]
    fn test_upstream_rejects_bad_urls() {
        assert!(Upstream::parse("localhost:8081").is_err());
        assert!(Upstream::parse("ftp://example.com").is_err());
        assert!(Upstream::parse("http://example.com/?x=1").is_err());
        assert!(Upstream::parse("").is_err());
    }

    #[test]
    fn test_defaults() {
        let listener = ListenerConfig::default();
        assert_eq!(listener.port, 8443);
        assert_eq!(listener.fallback_port, 8082);
        assert_eq!(listener.tls, TlsMode::Auto);

        let config = ProxyConfig::new(Upstream::parse("http://127.0.0.1:8000").unwrap());
        assert_eq!(config.request_timeout, Duration::from_secs(120));
        assert_eq!(config.health_timeout, Duration::from_secs(5));
    }
}
