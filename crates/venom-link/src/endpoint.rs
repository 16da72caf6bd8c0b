//! Endpoint resolution from the hosting origin.
//!
//! The dashboard is served either by its own dev server (UI and backend on
//! different ports) or from the backend's origin. [`resolve`] maps an explicit
//! [`PageOrigin`] to the backend's stream and HTTP endpoints for both cases.

use thiserror::Error;
use url::Url;

pub const DEFAULT_DEV_PORT: u16 = 4200;
pub const DEFAULT_SERVICE_PORT: u16 = 8000;
pub const STREAM_PATH: &str = "/ws/system-stream";
pub const COMMAND_PATH: &str = "/api/command";
pub const STATE_PATH: &str = "/api/state";
pub const HEALTH_PATH: &str = "/health";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("origin_protocol_missing")]
    MissingProtocol,
    #[error("origin_hostname_missing")]
    MissingHostname,
    #[error("origin_protocol_unsupported:{0}")]
    UnsupportedProtocol(String),
    #[error("origin_invalid:{0}")]
    InvalidOrigin(String),
}

/// Where the dashboard is being served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOrigin {
    /// `http` or `https`; a trailing `:` is accepted.
    pub protocol: String,
    pub hostname: String,
    /// `None` means the scheme's default port.
    pub port: Option<u16>,
}

impl PageOrigin {
    pub fn new(protocol: impl Into<String>, hostname: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            protocol: protocol.into(),
            hostname: hostname.into(),
            port,
        }
    }

    /// Parse an origin string such as `http://localhost:4200`.
    pub fn parse(origin: &str) -> Result<Self, ResolveError> {
        let trimmed = origin.trim();
        if trimmed.is_empty() {
            return Err(ResolveError::MissingProtocol);
        }
        let url = Url::parse(trimmed)
            .map_err(|error| ResolveError::InvalidOrigin(format!("{trimmed}: {error}")))?;
        let hostname = url
            .host_str()
            .map(str::to_string)
            .ok_or(ResolveError::MissingHostname)?;
        Ok(Self {
            protocol: url.scheme().to_string(),
            hostname,
            port: url.port(),
        })
    }
}

/// Dev-server port rewriting rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRule {
    pub dev_port: u16,
    pub service_port: u16,
}

impl Default for PortRule {
    fn default() -> Self {
        Self {
            dev_port: DEFAULT_DEV_PORT,
            service_port: DEFAULT_SERVICE_PORT,
        }
    }
}

/// Resolved backend endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub stream: Url,
    pub command: Url,
    pub state: Url,
    pub health: Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Security {
    Plain,
    Tls,
}

impl Security {
    fn from_protocol(protocol: &str) -> Result<Self, ResolveError> {
        let normalized = protocol.trim().trim_end_matches(':').to_ascii_lowercase();
        match normalized.as_str() {
            "" => Err(ResolveError::MissingProtocol),
            "http" => Ok(Self::Plain),
            "https" => Ok(Self::Tls),
            _ => Err(ResolveError::UnsupportedProtocol(protocol.trim().to_string())),
        }
    }

    fn stream_scheme(self) -> &'static str {
        match self {
            Self::Plain => "ws",
            Self::Tls => "wss",
        }
    }

    fn http_scheme(self) -> &'static str {
        match self {
            Self::Plain => "http",
            Self::Tls => "https",
        }
    }
}

/// Resolve backend endpoints for `origin`.
pub fn resolve(origin: &PageOrigin, rule: PortRule) -> Result<Endpoints, ResolveError> {
    let security = Security::from_protocol(&origin.protocol)?;
    let hostname = origin.hostname.trim();
    if hostname.is_empty() {
        return Err(ResolveError::MissingHostname);
    }

    let port = origin.port.map(|port| {
        if port == rule.dev_port {
            rule.service_port
        } else {
            port
        }
    });
    let authority = authority(hostname, port);

    Ok(Endpoints {
        stream: build_url(security.stream_scheme(), &authority, STREAM_PATH)?,
        command: build_url(security.http_scheme(), &authority, COMMAND_PATH)?,
        state: build_url(security.http_scheme(), &authority, STATE_PATH)?,
        health: build_url(security.http_scheme(), &authority, HEALTH_PATH)?,
    })
}

fn authority(hostname: &str, port: Option<u16>) -> String {
    let host = if hostname.contains(':') && !hostname.starts_with('[') {
        format!("[{hostname}]")
    } else {
        hostname.to_string()
    };
    match port {
        Some(port) => format!("{host}:{port}"),
        None => host,
    }
}

fn build_url(scheme: &str, authority: &str, path: &str) -> Result<Url, ResolveError> {
    let raw = format!("{scheme}://{authority}{path}");
    Url::parse(&raw).map_err(|error| ResolveError::InvalidOrigin(format!("{raw}: {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(origin: &PageOrigin) -> Endpoints {
        resolve(origin, PortRule::default()).expect("origin should resolve")
    }

    #[test]
    fn secure_origin_keeps_host_and_port() {
        let endpoints = resolved(&PageOrigin::new("https", "example.com", Some(443)));

        assert_eq!(endpoints.stream.scheme(), "wss");
        assert_eq!(endpoints.stream.host_str(), Some("example.com"));
        assert_eq!(endpoints.stream.port_or_known_default(), Some(443));
        assert_eq!(endpoints.stream.path(), STREAM_PATH);

        assert_eq!(endpoints.command.scheme(), "https");
        assert_eq!(endpoints.command.host_str(), Some("example.com"));
        assert_eq!(endpoints.command.port_or_known_default(), Some(443));
        assert_eq!(endpoints.command.path(), COMMAND_PATH);
    }

    #[test]
    fn dev_server_port_is_rewritten_to_service_port() {
        let endpoints = resolved(&PageOrigin::new("http:", "localhost", Some(4200)));

        assert_eq!(
            endpoints.stream.as_str(),
            "ws://localhost:8000/ws/system-stream"
        );
        assert_eq!(
            endpoints.command.as_str(),
            "http://localhost:8000/api/command"
        );
        assert_eq!(endpoints.state.as_str(), "http://localhost:8000/api/state");
        assert_eq!(endpoints.health.as_str(), "http://localhost:8000/health");
    }

    #[test]
    fn custom_rule_is_honoured() {
        let rule = PortRule {
            dev_port: 5173,
            service_port: 9000,
        };
        let dev = resolve(&PageOrigin::new("http", "127.0.0.1", Some(5173)), rule)
            .expect("dev origin");
        assert_eq!(dev.stream.port(), Some(9000));

        let other = resolve(&PageOrigin::new("http", "127.0.0.1", Some(4200)), rule)
            .expect("non-dev origin");
        assert_eq!(other.stream.port(), Some(4200));
    }

    #[test]
    fn default_port_stays_implicit() {
        let endpoints = resolved(&PageOrigin::new("https", "venom.example", None));
        assert_eq!(
            endpoints.stream.as_str(),
            "wss://venom.example/ws/system-stream"
        );
        assert_eq!(
            endpoints.command.as_str(),
            "https://venom.example/api/command"
        );
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        let endpoints = resolved(&PageOrigin::new("http", "::1", Some(8080)));
        assert_eq!(endpoints.stream.as_str(), "ws://[::1]:8080/ws/system-stream");
    }

    #[test]
    fn resolution_is_stable() {
        let origin = PageOrigin::new("https", "example.com", Some(8443));
        assert_eq!(resolved(&origin), resolved(&origin));
    }

    #[test]
    fn parse_reads_origin_strings() {
        let origin = PageOrigin::parse("http://localhost:4200").expect("origin");
        assert_eq!(origin, PageOrigin::new("http", "localhost", Some(4200)));

        let implicit = PageOrigin::parse("https://example.com/").expect("origin");
        assert_eq!(implicit.port, None);
    }

    #[test]
    fn misconfiguration_fails_loudly() {
        assert_eq!(
            resolve(&PageOrigin::new("", "example.com", None), PortRule::default()),
            Err(ResolveError::MissingProtocol)
        );
        assert_eq!(
            resolve(&PageOrigin::new("https", "  ", None), PortRule::default()),
            Err(ResolveError::MissingHostname)
        );
        assert_eq!(
            resolve(
                &PageOrigin::new("file", "example.com", None),
                PortRule::default()
            ),
            Err(ResolveError::UnsupportedProtocol("file".to_string()))
        );
        assert_eq!(PageOrigin::parse("   "), Err(ResolveError::MissingProtocol));
        assert!(matches!(
            PageOrigin::parse("not an origin"),
            Err(ResolveError::InvalidOrigin(_))
        ));
    }
}
