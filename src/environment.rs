//! Request environment snapshot and the policy checked against it.
//!
//! The snapshot is an explicit value handed to the dispatcher for every
//! request. Nothing in keel reads peer addresses or host names from
//! process-global state, so tests can build any environment they like.

use std::net::{IpAddr, SocketAddr};

use http::header::HOST;
use http::request::Parts;

use crate::error::EnvironmentError;

/// Peer address, host, port and scheme of one inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    peer_ip: IpAddr,
    forwarded_for: Vec<IpAddr>,
    hostname: String,
    port: u16,
    https: bool,
}

impl Environment {
    pub fn new(peer_ip: IpAddr, hostname: impl Into<String>, port: u16, https: bool) -> Self {
        Self {
            peer_ip,
            forwarded_for: Vec::new(),
            hostname: hostname.into(),
            port,
            https,
        }
    }

    /// Attach the `x-forwarded-for` chain, client first, as sent on the wire.
    pub fn with_forwarded_for(mut self, chain: Vec<IpAddr>) -> Self {
        self.forwarded_for = chain;
        self
    }

    /// Snapshot taken from a parsed hyper request.
    ///
    /// `x-forwarded-proto` is honoured only when the peer is one of
    /// `trusted_proxies`; anyone else could claim HTTPS.
    pub fn from_parts(parts: &Parts, remote: SocketAddr, trusted_proxies: &[IpAddr]) -> Self {
        let peer_ip = remote.ip();
        let trusted = trusted_proxies.contains(&peer_ip);

        let forwarded_proto = parts.headers.get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().eq_ignore_ascii_case("https"));
        let https = match forwarded_proto {
            Some(https) if trusted => https,
            _ => parts.uri.scheme_str() == Some("https"),
        };

        let authority = parts.uri.authority().map(|a| a.as_str().to_owned()).or_else(|| {
            parts.headers.get(HOST).and_then(|v| v.to_str().ok()).map(str::to_owned)
        });
        let default_port = if https { 443 } else { 80 };
        let (hostname, port) = match authority.as_deref() {
            Some(authority) => split_authority(authority, default_port),
            None => (String::new(), default_port),
        };

        let forwarded_for = parts.headers.get_all("x-forwarded-for").iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .filter_map(|hop| hop.trim().parse().ok())
            .collect();

        Self { peer_ip, forwarded_for, hostname, port, https }
    }

    pub fn peer_ip(&self) -> IpAddr { self.peer_ip }
    pub fn forwarded_for(&self) -> &[IpAddr] { &self.forwarded_for }
    pub fn hostname(&self) -> &str { &self.hostname }
    pub fn port(&self) -> u16 { self.port }
    pub fn is_https(&self) -> bool { self.https }

    pub fn scheme(&self) -> &'static str {
        if self.https { "https" } else { "http" }
    }
}

fn split_authority(authority: &str, default_port: u16) -> (String, u16) {
    // Bracketed IPv6 literals carry colons of their own.
    if let Some(rest) = authority.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail.strip_prefix(':').and_then(|p| p.parse().ok()).unwrap_or(default_port);
            return (host.to_ascii_lowercase(), port);
        }
    }
    match authority.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host.to_ascii_lowercase(), port),
            Err(_) => (authority.to_ascii_lowercase(), default_port),
        },
        None => (authority.to_ascii_lowercase(), default_port),
    }
}

// ── Policy ────────────────────────────────────────────────────────────────────

/// TLS and host/port expectations for incoming requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentPolicy {
    require_tls: bool,
    expected_host: Option<String>,
    expected_port: Option<u16>,
}

impl EnvironmentPolicy {
    /// A policy that accepts everything.
    pub fn new() -> Self { Self::default() }

    pub fn require_tls(mut self) -> Self {
        self.require_tls = true;
        self
    }

    /// Host names compare case-insensitively.
    pub fn expect_host(mut self, host: impl Into<String>) -> Self {
        self.expected_host = Some(host.into().to_ascii_lowercase());
        self
    }

    pub fn expect_port(mut self, port: u16) -> Self {
        self.expected_port = Some(port);
        self
    }

    pub fn is_permissive(&self) -> bool {
        !self.require_tls && self.expected_host.is_none() && self.expected_port.is_none()
    }

    /// Checks TLS first, then host, then port.
    pub fn check(&self, env: &Environment) -> Result<(), EnvironmentError> {
        if self.require_tls && !env.is_https() {
            return Err(EnvironmentError::TlsRequired { env: Box::new(env.clone()) });
        }
        if let Some(expected) = &self.expected_host {
            if !env.hostname().eq_ignore_ascii_case(expected) {
                return Err(EnvironmentError::HostMismatch {
                    expected: expected.clone(),
                    env: Box::new(env.clone()),
                });
            }
        }
        if let Some(expected) = self.expected_port {
            if env.port() != expected {
                return Err(EnvironmentError::PortMismatch { expected, env: Box::new(env.clone()) });
            }
        }
        Ok(())
    }
}
