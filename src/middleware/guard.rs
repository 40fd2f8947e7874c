//! TLS and host/port guards for group and route scopes.
//!
//! Both fail the request with a fatal [`EnvironmentError`](crate::EnvironmentError)
//! rather than a soft status response. The dispatcher logs it at `error`
//! with the full environment snapshot.

use super::{Contract, Middleware};
use crate::context::Context;
use crate::environment::EnvironmentPolicy;
use crate::error::Error;
use crate::interrupt::Outcome;

fn enforce(policy: &EnvironmentPolicy, ctx: &Context) -> Result<Outcome, Error> {
    policy.check(ctx.environment())?;
    Ok(Outcome::Continue)
}

/// Satisfies [`Contract::TLS`].
#[derive(Debug, Clone)]
pub struct TlsEnforcer {
    policy: EnvironmentPolicy,
}

impl TlsEnforcer {
    pub fn new() -> Self {
        Self { policy: EnvironmentPolicy::new().require_tls() }
    }
}

impl Default for TlsEnforcer {
    fn default() -> Self { Self::new() }
}

impl Middleware for TlsEnforcer {
    fn contract(&self) -> Contract { Contract::TLS }
    fn name(&self) -> &'static str { "tls" }

    fn process(&self, ctx: &mut Context) -> Result<Outcome, Error> {
        enforce(&self.policy, ctx)
    }
}

/// Satisfies [`Contract::HOST`].
#[derive(Debug, Clone)]
pub struct HostGuard {
    policy: EnvironmentPolicy,
}

impl HostGuard {
    pub fn new(host: impl Into<String>) -> Self {
        Self { policy: EnvironmentPolicy::new().expect_host(host) }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.policy = self.policy.expect_port(port);
        self
    }
}

impl Middleware for HostGuard {
    fn contract(&self) -> Contract { Contract::HOST }
    fn name(&self) -> &'static str { "host" }

    fn process(&self, ctx: &mut Context) -> Result<Outcome, Error> {
        enforce(&self.policy, ctx)
    }
}
