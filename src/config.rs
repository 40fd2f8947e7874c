//! Server settings.
//!
//! `Server::bind("0.0.0.0:3000")` is enough for local work. Deployments
//! behind a proxy usually want more: the proxies to trust for
//! `x-forwarded-*`, a TLS requirement, the public host name. [`Settings`]
//! collects those, from code, from any serde source, or from `KEEL_*`
//! environment variables.

use std::net::{IpAddr, SocketAddr};

use serde::Deserialize;

use crate::environment::EnvironmentPolicy;
use crate::error::ValidationError;

/// Runtime configuration consumed by [`Server`](crate::Server) and
/// [`Router::with_settings`](crate::Router::with_settings).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub addr: SocketAddr,
    pub require_tls: bool,
    pub expected_host: Option<String>,
    pub expected_port: Option<u16>,
    pub trusted_proxies: Vec<IpAddr>,
    /// Accept a well-formed inbound `x-request-id` instead of minting one.
    pub trust_request_id: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            require_tls: false,
            expected_host: None,
            expected_port: None,
            trusted_proxies: Vec::new(),
            trust_request_id: false,
        }
    }
}

impl Settings {
    /// Reads `KEEL_ADDR`, `KEEL_REQUIRE_TLS`, `KEEL_EXPECTED_HOST`,
    /// `KEEL_EXPECTED_PORT`, `KEEL_TRUSTED_PROXIES` (comma separated) and
    /// `KEEL_TRUST_REQUEST_ID`. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ValidationError> {
        let mut settings = Self::default();

        if let Some(addr) = lookup("KEEL_ADDR") {
            settings.addr = addr.trim().parse().map_err(|e| setting("KEEL_ADDR", e))?;
        }
        if let Some(flag) = lookup("KEEL_REQUIRE_TLS") {
            settings.require_tls = parse_flag("KEEL_REQUIRE_TLS", &flag)?;
        }
        if let Some(host) = lookup("KEEL_EXPECTED_HOST") {
            let host = host.trim();
            settings.expected_host = (!host.is_empty()).then(|| host.to_owned());
        }
        if let Some(port) = lookup("KEEL_EXPECTED_PORT") {
            settings.expected_port = Some(port.trim().parse().map_err(|e| setting("KEEL_EXPECTED_PORT", e))?);
        }
        if let Some(list) = lookup("KEEL_TRUSTED_PROXIES") {
            settings.trusted_proxies = list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse().map_err(|e| setting("KEEL_TRUSTED_PROXIES", e)))
                .collect::<Result<_, _>>()?;
        }
        if let Some(flag) = lookup("KEEL_TRUST_REQUEST_ID") {
            settings.trust_request_id = parse_flag("KEEL_TRUST_REQUEST_ID", &flag)?;
        }

        Ok(settings)
    }

    /// The TLS and host/port policy these settings describe.
    pub fn policy(&self) -> EnvironmentPolicy {
        let mut policy = EnvironmentPolicy::new();
        if self.require_tls {
            policy = policy.require_tls();
        }
        if let Some(host) = &self.expected_host {
            policy = policy.expect_host(host.clone());
        }
        if let Some(port) = self.expected_port {
            policy = policy.expect_port(port);
        }
        policy
    }
}

fn parse_flag(field: &'static str, value: &str) -> Result<bool, ValidationError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ValidationError::Setting { field, reason: format!("expected a boolean, got {other:?}") }),
    }
}

fn setting(field: &'static str, e: impl std::fmt::Display) -> ValidationError {
    ValidationError::Setting { field, reason: e.to_string() }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        assert_eq!(Settings::from_lookup(lookup(&[])).unwrap(), Settings::default());
        assert!(Settings::default().policy().is_permissive());
    }

    #[test]
    fn reads_every_variable() {
        let settings = Settings::from_lookup(lookup(&[
            ("KEEL_ADDR", "127.0.0.1:8080"),
            ("KEEL_REQUIRE_TLS", "yes"),
            ("KEEL_EXPECTED_HOST", "api.example.com"),
            ("KEEL_EXPECTED_PORT", "443"),
            ("KEEL_TRUSTED_PROXIES", "10.0.0.1, 10.0.0.2"),
            ("KEEL_TRUST_REQUEST_ID", "1"),
        ])).unwrap();

        assert_eq!(settings.addr, "127.0.0.1:8080".parse().unwrap());
        assert!(settings.require_tls);
        assert_eq!(settings.expected_host.as_deref(), Some("api.example.com"));
        assert_eq!(settings.expected_port, Some(443));
        assert_eq!(settings.trusted_proxies.len(), 2);
        assert!(settings.trust_request_id);
        assert!(!settings.policy().is_permissive());
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = Settings::from_lookup(lookup(&[("KEEL_REQUIRE_TLS", "maybe")])).unwrap_err();
        assert!(matches!(err, ValidationError::Setting { field: "KEEL_REQUIRE_TLS", .. }));

        let err = Settings::from_lookup(lookup(&[("KEEL_TRUSTED_PROXIES", "10.0.0.1,proxy")])).unwrap_err();
        assert!(matches!(err, ValidationError::Setting { field: "KEEL_TRUSTED_PROXIES", .. }));
    }

    #[test]
    fn deserializes_partial_json() {
        let settings: Settings = serde_json::from_str(r#"{"require_tls":true,"expected_port":8443}"#).unwrap();
        assert!(settings.require_tls);
        assert_eq!(settings.expected_port, Some(8443));
        assert_eq!(settings.addr, Settings::default().addr);
    }
}
