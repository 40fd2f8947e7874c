//! Request ID resolution.
//!
//! Every request gets an ID before anything else runs, so later stages can
//! put it in their logs. The dispatcher echoes it back in
//! `x-request-id` on every response, cached and finalized ones included.
//!
//! New IDs are UUID v7: time-ordered, so they sort the way requests
//! arrived.

use tracing::debug;
use uuid::Uuid;

use super::{Contract, Middleware};
use crate::context::Context;
use crate::error::Error;
use crate::interrupt::Outcome;

/// The header name for request ID propagation.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_INBOUND_LEN: usize = 128;

/// Satisfies [`Contract::REQUEST_ID`].
#[derive(Debug, Clone, Default)]
pub struct RequestIdResolver {
    trust_incoming: bool,
}

impl RequestIdResolver {
    /// Always mints a fresh ID.
    pub fn new() -> Self { Self::default() }

    /// Keeps a well-formed inbound `x-request-id`; for services behind
    /// something that already assigns IDs.
    pub fn trust_incoming() -> Self {
        Self { trust_incoming: true }
    }
}

fn acceptable(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_INBOUND_LEN && id.bytes().all(|b| b.is_ascii_graphic())
}

impl Middleware for RequestIdResolver {
    fn contract(&self) -> Contract { Contract::REQUEST_ID }
    fn name(&self) -> &'static str { "request-id" }

    fn process(&self, ctx: &mut Context) -> Result<Outcome, Error> {
        let inbound = self.trust_incoming
            .then(|| ctx.request().header(REQUEST_ID_HEADER))
            .flatten()
            .filter(|id| acceptable(id))
            .map(str::to_owned);

        let id = inbound.unwrap_or_else(|| Uuid::now_v7().to_string());
        debug!(request_id = %id, method = %ctx.request().method(), path = ctx.request().path(), "request id assigned");
        ctx.set_request_id(id);
        Ok(Outcome::Continue)
    }
}
