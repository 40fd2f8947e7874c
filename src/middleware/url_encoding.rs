//! URL-encoding enforcement.
//!
//! Rejects paths and query strings that carry raw bytes outside RFC 3986 or
//! a `%` not followed by two hex digits. Such requests end here with a
//! finalized `400 Bad Request`; the controller never sees them.

use http::StatusCode;
use tracing::warn;

use super::{Contract, Middleware};
use crate::context::Context;
use crate::error::Error;
use crate::hooks::Diagnostic;
use crate::interrupt::Outcome;
use crate::request::hex;

/// Satisfies [`Contract::URL_ENCODING`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlEncodingEnforcer;

impl UrlEncodingEnforcer {
    pub fn new() -> Self { Self }
}

fn allowed(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"-._~!$&'()*+,;=:@/?".contains(&b)
}

/// Offset of the first malformed byte, if any.
fn first_violation(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let valid = matches!(
                    (bytes.get(i + 1).copied().and_then(hex), bytes.get(i + 2).copied().and_then(hex)),
                    (Some(_), Some(_))
                );
                if !valid {
                    return Some(i);
                }
                i += 3;
            }
            b if allowed(b) => i += 1,
            _ => return Some(i),
        }
    }
    None
}

impl Middleware for UrlEncodingEnforcer {
    fn contract(&self) -> Contract { Contract::URL_ENCODING }
    fn name(&self) -> &'static str { "url-encoding" }

    fn process(&self, ctx: &mut Context) -> Result<Outcome, Error> {
        let request = ctx.request();
        let violation = first_violation(request.path())
            .map(|at| ("path", request.path().to_owned(), at))
            .or_else(|| {
                let query = request.raw_query()?;
                first_violation(query).map(|at| ("query", query.to_owned(), at))
            });

        let Some((part, value, at)) = violation else {
            return Ok(Outcome::Continue);
        };

        warn!(request_id = ctx.request_id(), part, offset = at, "malformed url encoding");
        ctx.report_invalid_payload(Diagnostic {
            request_id: ctx.request_id().map(str::to_owned),
            subject: part.to_owned(),
            reason: format!("malformed encoding at byte {at} of {value:?}"),
        });
        Ok(Outcome::status(StatusCode::BAD_REQUEST))
    }
}
