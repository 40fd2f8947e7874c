//! Client IP resolution.

use std::net::IpAddr;

use tracing::debug;

use super::{Contract, Middleware};
use crate::context::Context;
use crate::error::Error;
use crate::interrupt::Outcome;

/// Satisfies [`Contract::CLIENT_IP`].
///
/// Starts at the peer address and walks `x-forwarded-for` from the right,
/// one hop per trusted proxy. The first address not vouched for by a
/// trusted hop is the client. With no trusted proxies the peer is the
/// client.
#[derive(Debug, Clone, Default)]
pub struct ClientIpResolver {
    trusted_proxies: Vec<IpAddr>,
}

impl ClientIpResolver {
    pub fn new() -> Self { Self::default() }

    pub fn trusting(proxies: Vec<IpAddr>) -> Self {
        Self { trusted_proxies: proxies }
    }

    fn resolve(&self, peer: IpAddr, forwarded_for: &[IpAddr]) -> IpAddr {
        let mut client = peer;
        for &hop in forwarded_for.iter().rev() {
            if !self.trusted_proxies.contains(&client) {
                break;
            }
            client = hop;
        }
        client
    }
}

impl Middleware for ClientIpResolver {
    fn contract(&self) -> Contract { Contract::CLIENT_IP }
    fn name(&self) -> &'static str { "client-ip" }

    fn process(&self, ctx: &mut Context) -> Result<Outcome, Error> {
        let env = ctx.environment();
        let client = self.resolve(env.peer_ip(), env.forwarded_for());
        debug!(request_id = ctx.request_id(), client = %client, peer = %env.peer_ip(), "client ip resolved");
        ctx.set_client_ip(client);
        Ok(Outcome::Continue)
    }
}
