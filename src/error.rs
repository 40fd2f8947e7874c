//! Unified error types.
//!
//! Interrupts are not errors: a cache hit, a file download or an explicitly
//! finalized response travel as [`Outcome`](crate::Outcome) values. `Error`
//! covers the fatal cases only. Misconfiguration (a malformed pointer, an
//! unresolvable middleware contract) and environment violations (TLS
//! required, wrong host) all end up here and surface at the dispatcher
//! boundary as a bare status response.

use std::fmt;
use std::path::PathBuf;

use http::StatusCode;

use crate::environment::Environment;
use crate::middleware::{Contract, Scope};

/// The error type returned by keel's fallible operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    #[error("missing required parameters: {}", .0.join(", "))]
    MissingParameters(Vec<String>),

    #[error("unrecognized parameters: {}", .0.join(", "))]
    UnrecognizedParameters(Vec<String>),

    /// A file download was requested after the controller had already
    /// written payload bytes. Streaming now would corrupt the body.
    #[error("file download started with {0} payload bytes already buffered")]
    BufferedOutput(usize),

    /// Transport-completion marker: the response for this request has
    /// already left the dispatcher.
    #[error("response already sent")]
    ResponseSent,
}

impl Error {
    /// The status code written to the wire when this error reaches the
    /// dispatcher boundary. The error text itself never does.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingParameters(_) | Self::UnrecognizedParameters(_) => StatusCode::BAD_REQUEST,
            Self::Environment(EnvironmentError::TlsRequired { .. }) => StatusCode::FORBIDDEN,
            Self::Environment(_) => StatusCode::MISDIRECTED_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ── Construction validation ───────────────────────────────────────────────────

/// A value object refused its input. Always a caller or configuration bug.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be {min} to {max} characters long, got {len}")]
    Length { field: &'static str, len: usize, min: usize, max: usize },

    #[error("{field} {value:?} contains characters outside {allowed}")]
    Charset { field: &'static str, value: String, allowed: &'static str },

    #[error("{field} must be within {min}..={max}, got {value}")]
    Range { field: &'static str, value: i64, min: i64, max: i64 },

    #[error("{field} {value:?} is not a valid identifier")]
    Identifier { field: &'static str, value: String },

    #[error("controller `{controller}` declares entrypoint `{entrypoint}` but has no such method")]
    UnknownEntrypoint { controller: &'static str, entrypoint: String },

    #[error("{} does not resolve to a file: {reason}", .path.display())]
    UnresolvedPath { path: PathBuf, reason: String },

    #[error("setting {field}: {reason}")]
    Setting { field: &'static str, reason: String },
}

// ── Middleware resolution ─────────────────────────────────────────────────────

/// A scope required a contract the available middleware could not satisfy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot resolve `{contract}` at {scope} scope: {context}")]
pub struct ResolutionError {
    pub scope: Scope,
    pub contract: Contract,
    pub context: Reason,
}

/// Why a contract failed to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// No available implementation claims the contract.
    Missing,
    /// More than one implementation claims it; the names are listed in
    /// registration order.
    Ambiguous { candidates: Vec<&'static str> },
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("no implementation provided"),
            Self::Ambiguous { candidates } => {
                write!(f, "claimed by {} implementations ({})", candidates.len(), candidates.join(", "))
            }
        }
    }
}

// ── Environment / security ────────────────────────────────────────────────────

/// The request environment violates the configured policy.
///
/// Every variant keeps the full [`Environment`] snapshot for audit logs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvironmentError {
    #[error("TLS required but {} arrived over {} (host {}:{})",
        .env.peer_ip(), .env.scheme(), .env.hostname(), .env.port())]
    TlsRequired { env: Box<Environment> },

    #[error("host mismatch: expected {expected}, got {} from {}", .env.hostname(), .env.peer_ip())]
    HostMismatch { expected: String, env: Box<Environment> },

    #[error("port mismatch: expected {expected}, got {} from {}", .env.port(), .env.peer_ip())]
    PortMismatch { expected: u16, env: Box<Environment> },
}

impl EnvironmentError {
    pub fn environment(&self) -> &Environment {
        match self {
            Self::TlsRequired { env } | Self::HostMismatch { env, .. } | Self::PortMismatch { env, .. } => env,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_errors_map_to_bad_request() {
        assert_eq!(Error::MissingParameters(vec!["id".into()]).status(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::UnrecognizedParameters(vec!["x".into()]).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn configuration_errors_map_to_internal_error() {
        let err = Error::from(ResolutionError {
            scope: Scope::Kernel,
            contract: Contract::REQUEST_ID,
            context: Reason::Missing,
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(Error::BufferedOutput(3).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn environment_errors_keep_the_snapshot() {
        let env = Environment::new("10.0.0.7".parse().unwrap(), "api.internal", 80, false);
        let err = EnvironmentError::TlsRequired { env: Box::new(env.clone()) };
        assert_eq!(err.environment(), &env);
        assert_eq!(Error::from(err).status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn resolution_error_names_scope_and_contract() {
        let err = ResolutionError {
            scope: Scope::Group,
            contract: Contract::TLS,
            context: Reason::Ambiguous { candidates: vec!["a", "b"] },
        };
        assert_eq!(
            err.to_string(),
            "cannot resolve `tls` at group scope: claimed by 2 implementations (a, b)"
        );
    }
}
