//! Per-request state shared by middleware and controllers.
//!
//! [`Context`] is the whole controller-facing API: request data, a
//! writable status/headers/payload, the parameter check and the
//! `Cache-Control` setting. When the controller returns
//! [`Outcome::Continue`] the dispatcher assembles the response from it.

use std::mem;
use std::net::IpAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;

use crate::cache::{CacheProvider, CachedResponsePointer, CachedResult};
use crate::cache_control::CacheControl;
use crate::controller::ControllerAttributes;
use crate::environment::Environment;
use crate::error::Error;
use crate::hooks::{Diagnostic, Hooks};
use crate::interrupt::{EmissionKind, Outcome, Phase};
use crate::request::Request;
use crate::response::{Body, ContentType, Response};

/// One request's view of the world, owned by the dispatcher.
pub struct Context {
    request: Request,
    env: Environment,
    hooks: Arc<Hooks>,
    request_id: Option<String>,
    client_ip: Option<IpAddr>,
    attributes: Option<Arc<ControllerAttributes>>,
    status: StatusCode,
    headers: Vec<(String, String)>,
    payload: Vec<u8>,
    cache_control: Option<CacheControl>,
    phase: Phase,
}

impl Context {
    pub fn new(request: Request, env: Environment) -> Self {
        Self {
            request,
            env,
            hooks: Arc::new(Hooks::default()),
            request_id: None,
            client_ip: None,
            attributes: None,
            status: StatusCode::OK,
            headers: Vec::new(),
            payload: Vec::new(),
            cache_control: None,
            phase: Phase::Running,
        }
    }

    pub(crate) fn with_hooks(mut self, hooks: Arc<Hooks>) -> Self {
        self.hooks = hooks;
        self
    }

    // ── Request side ──────────────────────────────────────────────────────────

    pub fn request(&self) -> &Request { &self.request }
    pub(crate) fn request_mut(&mut self) -> &mut Request { &mut self.request }
    pub fn environment(&self) -> &Environment { &self.env }

    pub fn request_id(&self) -> Option<&str> { self.request_id.as_deref() }
    pub fn set_request_id(&mut self, id: impl Into<String>) { self.request_id = Some(id.into()); }

    /// Client address once the client-IP stage ran; the peer before that.
    pub fn client_ip(&self) -> IpAddr { self.client_ip.unwrap_or(self.env.peer_ip()) }
    pub fn set_client_ip(&mut self, ip: IpAddr) { self.client_ip = Some(ip); }

    pub fn attributes(&self) -> Option<&ControllerAttributes> { self.attributes.as_deref() }

    pub(crate) fn set_attributes(&mut self, attributes: Arc<ControllerAttributes>) {
        self.attributes = Some(attributes);
    }

    /// Path parameter from the route pattern.
    pub fn param(&self, name: &str) -> Option<&str> { self.request.param(name) }

    /// First decoded query value for `name`.
    pub fn query(&self, name: &str) -> Option<String> { self.request.query(name) }

    /// Fails unless every parameter the entrypoint marks as required was
    /// supplied, either in the query or as a path parameter.
    pub fn require_params(&self) -> Result<(), Error> {
        let Some(attributes) = &self.attributes else { return Ok(()) };
        let supplied = self.request.query_pairs();
        let missing: Vec<String> = attributes.params().iter()
            .filter(|p| p.is_required())
            .filter(|p| self.request.param(p.name()).is_none() && !supplied.iter().any(|(k, _)| k == p.name()))
            .map(|p| p.name().to_owned())
            .collect();

        if missing.is_empty() {
            return Ok(());
        }
        self.report_invalid_payload(Diagnostic {
            request_id: self.request_id.clone(),
            subject: missing.join(","),
            reason: "required parameters missing".to_owned(),
        });
        Err(Error::MissingParameters(missing))
    }

    /// Fails when the entrypoint rejects unrecognized parameters and the
    /// query carries any it does not declare.
    pub(crate) fn enforce_recognized_params(&self) -> Result<(), Error> {
        let Some(attributes) = &self.attributes else { return Ok(()) };
        if !attributes.reject_unrecognized_params() {
            return Ok(());
        }

        let mut unknown: Vec<String> = Vec::new();
        for (key, _) in self.request.query_pairs() {
            if !attributes.is_declared(&key) && !unknown.contains(&key) {
                unknown.push(key);
            }
        }
        if unknown.is_empty() {
            return Ok(());
        }
        self.report_invalid_payload(Diagnostic {
            request_id: self.request_id.clone(),
            subject: unknown.join(","),
            reason: format!("not accepted by {}", attributes.entrypoint()),
        });
        Err(Error::UnrecognizedParameters(unknown))
    }

    // ── Response side ─────────────────────────────────────────────────────────

    pub fn set_status(&mut self, status: StatusCode) { self.status = status; }

    /// Adds a header; names are matched case-insensitively and a later call
    /// replaces an earlier value.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name.to_ascii_lowercase(), value)),
        }
    }

    pub fn set_content_type(&mut self, content_type: ContentType) {
        self.set_header("content-type", content_type.as_str());
    }

    pub fn headers(&self) -> &[(String, String)] { &self.headers }

    /// Appends to the response payload.
    pub fn write(&mut self, bytes: &[u8]) { self.payload.extend_from_slice(bytes); }

    pub fn payload(&self) -> &[u8] { &self.payload }
    pub fn payload_mut(&mut self) -> &mut Vec<u8> { &mut self.payload }

    pub fn set_cache_control(&mut self, cache_control: CacheControl) {
        self.cache_control = Some(cache_control);
    }

    pub fn cache_control(&self) -> Option<&CacheControl> { self.cache_control.as_ref() }

    // ── Cache helpers ─────────────────────────────────────────────────────────

    /// `Some(Outcome::Cached)` on a hit; return it to short-circuit.
    pub fn cached(&self, provider: &dyn CacheProvider, pointer: &CachedResponsePointer) -> Option<Outcome> {
        provider.get(pointer).map(Outcome::Cached)
    }

    /// Stores the response assembled so far under `pointer`, stamped with
    /// the provider's clock.
    pub fn store(&self, provider: &dyn CacheProvider, pointer: &CachedResponsePointer) {
        let result = CachedResult::new(
            self.status,
            self.response_headers(),
            self.payload.clone(),
            provider.timestamp(),
        );
        provider.store(pointer, result);
    }

    // ── Emission ──────────────────────────────────────────────────────────────

    pub fn phase(&self) -> Phase { self.phase }

    pub(crate) fn begin_emission(&mut self, kind: EmissionKind) -> Result<(), Error> {
        match self.phase {
            Phase::Running => {
                self.phase = Phase::Emitting(kind);
                Ok(())
            }
            Phase::Emitting(_) | Phase::Sent => Err(Error::ResponseSent),
        }
    }

    /// A failure replaces whatever emission was under way.
    pub(crate) fn fail_emission(&mut self) {
        self.phase = Phase::Emitting(EmissionKind::Failure);
    }

    pub(crate) fn mark_sent(&mut self) {
        self.phase = Phase::Sent;
    }

    pub(crate) fn report_invalid_header(&self, diagnostic: Diagnostic) {
        self.hooks.invalid_header(&diagnostic);
    }

    pub(crate) fn report_invalid_payload(&self, diagnostic: Diagnostic) {
        self.hooks.invalid_payload(&diagnostic);
    }

    fn response_headers(&self) -> Vec<(String, String)> {
        let mut headers = self.headers.clone();
        if let Some(cc) = &self.cache_control {
            headers.retain(|(n, _)| !n.eq_ignore_ascii_case("cache-control"));
            headers.push(("cache-control".to_owned(), cc.header_value()));
        }
        headers
    }

    /// Moves the controller-built status, headers and payload out.
    pub(crate) fn take_response(&mut self) -> Response {
        Response {
            status: self.status,
            headers: self.response_headers(),
            body: Body::Bytes(Bytes::from(mem::take(&mut self.payload))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::Method;

    use super::*;
    use crate::cache::{ManualClock, MemoryCacheProvider};
    use crate::cache_control::StoreDirective;
    use crate::controller::{Controller, Descriptor, MethodDescriptor, Param, attributes_for};

    struct Search;

    impl Search {
        fn run(&self, _ctx: &mut Context) -> Result<Outcome, Error> { Ok(Outcome::Continue) }
    }

    impl Controller for Search {
        fn descriptor() -> Descriptor<Self> {
            Descriptor::new("run")
                .method(MethodDescriptor::new("run", Self::run).params(&[Param::required("q"), Param::optional("page")]))
        }
    }

    fn ctx(target: &str) -> Context {
        let env = Environment::new("127.0.0.1".parse().unwrap(), "localhost", 80, false);
        let mut ctx = Context::new(Request::new(Method::GET, target), env);
        ctx.set_attributes(attributes_for::<Search>().unwrap());
        ctx
    }

    #[test]
    fn required_params_must_be_present() {
        assert!(ctx("/search?q=rust").require_params().is_ok());
        match ctx("/search?page=2").require_params() {
            Err(Error::MissingParameters(missing)) => assert_eq!(missing, vec!["q".to_owned()]),
            other => panic!("expected missing parameters, got {other:?}"),
        }
    }

    #[test]
    fn unrecognized_params_are_listed_once() {
        assert!(ctx("/search?q=a&page=1").enforce_recognized_params().is_ok());
        match ctx("/search?q=a&debug=1&debug=2&x").enforce_recognized_params() {
            Err(Error::UnrecognizedParameters(unknown)) => assert_eq!(unknown, vec!["debug".to_owned(), "x".to_owned()]),
            other => panic!("expected unrecognized parameters, got {other:?}"),
        }
    }

    #[test]
    fn invalid_payload_hook_sees_missing_params() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let hooks = Hooks::new().on_invalid_payload(move |d| *sink.lock().unwrap() = Some(d.subject.clone()));
        let ctx = ctx("/search").with_hooks(Arc::new(hooks));

        assert!(ctx.require_params().is_err());
        assert_eq!(seen.lock().unwrap().as_deref(), Some("q"));
    }

    #[test]
    fn headers_replace_case_insensitively() {
        let mut ctx = ctx("/");
        ctx.set_header("X-Trace", "1");
        ctx.set_header("x-trace", "2");
        assert_eq!(ctx.headers(), &[("x-trace".to_owned(), "2".to_owned())]);
    }

    #[test]
    fn cache_control_is_folded_into_the_response() {
        let mut ctx = ctx("/");
        ctx.set_header("cache-control", "no-store");
        ctx.set_cache_control(CacheControl::new(StoreDirective::Public).max_age(3600));
        ctx.write(b"hi");
        let res = ctx.take_response();
        assert_eq!(res.headers(), &[("cache-control".to_owned(), "public, max-age=3600, s-maxage=3600".to_owned())]);
        assert_eq!(res.body_bytes(), Some(&b"hi"[..]));
        assert!(ctx.payload().is_empty());
    }

    #[test]
    fn store_then_cached_round_trips_through_the_provider() {
        let cache = MemoryCacheProvider::with_clock(ManualClock::new(50));
        let pointer = CachedResponsePointer::new("search:rust", ["search"], 30).unwrap();
        let mut ctx = ctx("/search?q=rust");
        assert!(ctx.cached(&cache, &pointer).is_none());

        ctx.set_status(StatusCode::CREATED);
        ctx.set_content_type(ContentType::Json);
        ctx.write(b"[]");
        ctx.store(&cache, &pointer);

        let Some(Outcome::Cached(hit)) = ctx.cached(&cache, &pointer) else { panic!("expected a hit") };
        assert_eq!(hit.status(), StatusCode::CREATED);
        assert_eq!(hit.body(), b"[]");
        assert_eq!(hit.stored_at(), 50);
    }

    #[test]
    fn emission_moves_forward_only() {
        let mut ctx = ctx("/");
        assert_eq!(ctx.phase(), Phase::Running);
        ctx.begin_emission(EmissionKind::Download).unwrap();
        assert!(matches!(ctx.begin_emission(EmissionKind::Normal), Err(Error::ResponseSent)));
        ctx.fail_emission();
        assert_eq!(ctx.phase(), Phase::Emitting(EmissionKind::Failure));
        ctx.mark_sent();
        assert_eq!(ctx.phase(), Phase::Sent);
        assert!(matches!(ctx.begin_emission(EmissionKind::Failure), Err(Error::ResponseSent)));
    }
}
