//! Scoped middleware.
//!
//! Middleware is organised by [`Contract`]: an abstract capability such as
//! "resolve the request ID". Each [`Scope`] requires a list of contracts;
//! the kernel scope always requires request-ID resolution, URL-encoding
//! enforcement and client-IP resolution, in that order. Group and route
//! declarations add their own.
//!
//! Concrete [`Middleware`] values each claim one contract. The
//! [`resolve`] step matches requirements to implementations and produces a
//! [`ResolvedPipeline`], or a [`ResolutionError`](crate::ResolutionError)
//! naming the scope and contract that could not be satisfied. Two
//! implementations claiming the same contract in one scope is a
//! configuration defect and fails resolution as well.
//!
//! Stages run synchronously, one after the other. A stage returning a
//! terminal [`Outcome`] stops the pipeline there.
//!
//! Built-in implementations:
//!
//! | Contract | Implementation |
//! |---|---|
//! | `request-id` | [`RequestIdResolver`] |
//! | `url-encoding` | [`UrlEncodingEnforcer`] |
//! | `client-ip` | [`ClientIpResolver`] |
//! | `tls` | [`TlsEnforcer`] |
//! | `host` | [`HostGuard`] |

mod client_ip;
mod guard;
mod registry;
mod request_id;
mod resolver;
mod url_encoding;

use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;
use crate::interrupt::Outcome;

pub use client_ip::ClientIpResolver;
pub use guard::{HostGuard, TlsEnforcer};
pub use request_id::{REQUEST_ID_HEADER, RequestIdResolver};
pub use resolver::{ResolvedPipeline, resolve};
pub use url_encoding::UrlEncodingEnforcer;

/// Where a middleware requirement is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Every request.
    Kernel,
    /// Every route of a router group.
    Group,
    /// A single route.
    Route,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Kernel => "kernel",
            Self::Group  => "group",
            Self::Route  => "route",
        })
    }
}

/// Tag naming a middleware capability.
///
/// Applications can define their own with [`Contract::new`] and require
/// them at group or route scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Contract(&'static str);

impl Contract {
    pub const REQUEST_ID: Self = Self("request-id");
    pub const URL_ENCODING: Self = Self("url-encoding");
    pub const CLIENT_IP: Self = Self("client-ip");
    pub const TLS: Self = Self("tls");
    pub const HOST: Self = Self("host");

    pub const fn new(tag: &'static str) -> Self { Self(tag) }

    pub fn as_str(self) -> &'static str { self.0 }
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A concrete pipeline stage.
pub trait Middleware: Send + Sync + 'static {
    /// The contract this implementation satisfies.
    fn contract(&self) -> Contract;

    /// Name used in logs and ambiguity reports.
    fn name(&self) -> &'static str;

    fn process(&self, ctx: &mut Context) -> Result<Outcome, Error>;
}

/// A type-erased middleware shared by every pipeline that uses it.
pub type BoxedMiddleware = Arc<dyn Middleware>;
