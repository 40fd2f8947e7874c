//! Request dispatch: pipelines, controller, emission.
//!
//! ```text
//! environment policy
//!        ↓
//! kernel pipeline   (request-id → url-encoding → client-ip)
//!        ↓ route lookup                       404 → finalized
//! group + route pipeline
//!        ↓ unrecognized-parameter check
//! controller entrypoint
//!        ↓ Continue → Controller::finish, response from Context
//! emission          (every path: one header-assignment step)
//! ```
//!
//! Any stage may return a terminal [`Outcome`]; the remaining steps are
//! skipped and the outcome goes straight to emission. Errors go to the
//! failure path, which logs them and emits a bare status response.

use std::sync::Arc;

use http::{HeaderName, HeaderValue, StatusCode};
use tracing::{debug, error, warn};

use crate::context::Context;
use crate::environment::Environment;
use crate::error::Error;
use crate::hooks::Diagnostic;
use crate::interrupt::{EmissionKind, Finalize, Outcome};
use crate::middleware::REQUEST_ID_HEADER;
use crate::request::Request;
use crate::response::{Response, ResponseBody, empty_body};
use crate::router::Router;

impl Router {
    /// Processes one request end to end. Never fails: errors become status
    /// responses.
    pub async fn dispatch(&self, request: Request, env: Environment) -> http::Response<ResponseBody> {
        let mut ctx = Context::new(request, env).with_hooks(Arc::clone(&self.hooks));

        let response = match self.process(&mut ctx).and_then(|outcome| emit(&mut ctx, outcome)) {
            Ok(response) => response,
            Err(e) => failure(&mut ctx, &e),
        };

        send(&mut ctx, response).await
    }

    fn process(&self, ctx: &mut Context) -> Result<Outcome, Error> {
        self.policy.check(ctx.environment())?;

        let outcome = self.kernel_pipeline()?.run(ctx)?;
        if !outcome.is_continue() {
            return Ok(outcome);
        }

        let Some((entry, params)) = self.lookup(ctx.request().method(), ctx.request().path()) else {
            debug!(request_id = ctx.request_id(), path = ctx.request().path(), "no route");
            return Ok(Outcome::status(StatusCode::NOT_FOUND));
        };
        ctx.request_mut().set_params(params);
        ctx.set_attributes(Arc::clone(entry.handler.attributes()));

        let outcome = self.route_pipeline(entry)?.run(ctx)?;
        if !outcome.is_continue() {
            return Ok(outcome);
        }

        ctx.enforce_recognized_params()?;
        let outcome = entry.handler.call(ctx)?;
        if outcome.is_continue() {
            entry.handler.finish(ctx);
        }
        Ok(outcome)
    }
}

/// Turns the final outcome into a transport-neutral response.
fn emit(ctx: &mut Context, outcome: Outcome) -> Result<Response, Error> {
    let kind = outcome.kind().unwrap_or(EmissionKind::Normal);
    ctx.begin_emission(kind)?;

    match outcome {
        Outcome::Continue => Ok(ctx.take_response()),
        Outcome::Cached(result) => {
            debug!(request_id = ctx.request_id(), stored_at = result.stored_at(), "serving cached response");
            Ok(Response::from(result))
        }
        Outcome::Download(download) => {
            let buffered = ctx.payload().len();
            if buffered > 0 {
                return Err(Error::BufferedOutput(buffered));
            }
            debug!(request_id = ctx.request_id(), file = %download.path().display(), "streaming download");
            Ok(Box::new(download).response_object())
        }
        Outcome::Finalized(finalized) => {
            debug!(request_id = ctx.request_id(), status = %finalized.status(), "response finalized");
            Ok(finalized.response_object())
        }
    }
}

fn failure(ctx: &mut Context, e: &Error) -> Response {
    ctx.fail_emission();
    let request_id = ctx.request_id();
    match e {
        Error::Environment(env_err) => {
            let env = env_err.environment();
            error!(
                request_id,
                peer = %env.peer_ip(),
                forwarded_for = ?env.forwarded_for(),
                scheme = env.scheme(),
                host = env.hostname(),
                port = env.port(),
                "environment rejected: {e}"
            );
        }
        Error::Resolution(r) => {
            error!(request_id, scope = %r.scope, contract = %r.contract, "middleware resolution failed: {e}");
        }
        Error::MissingParameters(_) | Error::UnrecognizedParameters(_) => {
            warn!(request_id, "request rejected: {e}");
        }
        _ => error!(request_id, "request failed: {e}"),
    }
    Response::status(e.status())
}

/// The single place a response gets its headers and body.
async fn send(ctx: &mut Context, response: Response) -> http::Response<ResponseBody> {
    let Response { status, headers, body } = response;

    let mut out = match Response::into_body(body).await {
        Ok(body) => {
            let mut out = http::Response::new(body);
            *out.status_mut() = status;
            assign_headers(ctx, &mut out, &headers);
            out
        }
        Err(e) => {
            error!(request_id = ctx.request_id(), "response body unavailable: {e}");
            let mut out = http::Response::new(empty_body());
            *out.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            out
        }
    };

    if let Some(id) = ctx.request_id().and_then(|id| HeaderValue::from_str(id).ok()) {
        out.headers_mut().insert(REQUEST_ID_HEADER, id);
    }
    ctx.mark_sent();
    out
}

/// Headers the transport cannot carry are dropped and reported.
fn assign_headers(ctx: &Context, out: &mut http::Response<ResponseBody>, headers: &[(String, String)]) {
    for (name, value) in headers {
        let parsed = HeaderName::try_from(name.as_str())
            .map_err(|e| e.to_string())
            .and_then(|n| HeaderValue::try_from(value.as_str()).map(|v| (n, v)).map_err(|e| e.to_string()));
        match parsed {
            Ok((name, value)) => {
                out.headers_mut().append(name, value);
            }
            Err(reason) => {
                warn!(request_id = ctx.request_id(), header = %name, "dropping invalid header: {reason}");
                ctx.report_invalid_header(Diagnostic {
                    request_id: ctx.request_id().map(str::to_owned),
                    subject: name.clone(),
                    reason,
                });
            }
        }
    }
}
