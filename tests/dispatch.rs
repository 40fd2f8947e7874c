//! End-to-end request lifecycle through `Router::dispatch`, no socket.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::BodyExt;
use keel::cache::{CachedResponsePointer, MemoryCacheProvider};
use keel::middleware::{Contract, HostGuard, Middleware, REQUEST_ID_HEADER, Scope, TlsEnforcer};
use keel::{
    CacheControl, ContentType, Context, Controller, Descriptor, Environment, Error, FileDownload, MethodDescriptor,
    Outcome, Param, Reason, Request, ResponseBody, Router, StoreDirective,
};

fn plain() -> Environment {
    Environment::new("127.0.0.1".parse().unwrap(), "api.test", 80, false)
}

fn secure() -> Environment {
    Environment::new("127.0.0.1".parse().unwrap(), "api.test", 443, true)
}

async fn body(res: http::Response<ResponseBody>) -> Bytes {
    res.into_body().collect().await.unwrap().to_bytes()
}

fn header<'a>(res: &'a http::Response<ResponseBody>, name: &str) -> Option<&'a str> {
    res.headers().get(name).and_then(|v| v.to_str().ok())
}

// ── Controllers ──────────────────────────────────────────────────────────────

struct Hello;

impl Hello {
    fn greet(&self, ctx: &mut Context) -> Result<Outcome, Error> {
        let name = ctx.query("name").unwrap_or_else(|| "world".to_owned());
        ctx.set_content_type(ContentType::Text);
        ctx.write(format!("hello {name}").as_bytes());
        Ok(Outcome::Continue)
    }
}

impl Controller for Hello {
    fn descriptor() -> Descriptor<Self> {
        Descriptor::new("greet").method(MethodDescriptor::new("greet", Self::greet).params(&[Param::optional("name")]))
    }
}

static ARTICLE_FINISHES: AtomicUsize = AtomicUsize::new(0);
static ARTICLE_RENDERS: AtomicUsize = AtomicUsize::new(0);

struct Articles {
    cache: Arc<MemoryCacheProvider>,
}

impl Articles {
    fn show(&self, ctx: &mut Context) -> Result<Outcome, Error> {
        let id = ctx.param("id").unwrap_or_default().to_owned();
        let pointer = CachedResponsePointer::new(format!("article:{id}"), ["articles"], 60)
            .map_err(Error::Validation)?;
        if let Some(hit) = ctx.cached(self.cache.as_ref(), &pointer) {
            return Ok(hit);
        }

        ARTICLE_RENDERS.fetch_add(1, Ordering::SeqCst);
        ctx.set_content_type(ContentType::Json);
        ctx.set_header("x-rendered", "fresh");
        ctx.set_cache_control(CacheControl::new(StoreDirective::Public).max_age(60));
        ctx.write(format!(r#"{{"id":"{id}"}}"#).as_bytes());
        ctx.store(self.cache.as_ref(), &pointer);
        Ok(Outcome::Continue)
    }
}

impl Controller for Articles {
    fn descriptor() -> Descriptor<Self> {
        Descriptor::new("show").method(MethodDescriptor::new("show", Self::show))
    }

    fn finish(&self, _ctx: &mut Context) {
        ARTICLE_FINISHES.fetch_add(1, Ordering::SeqCst);
    }
}

struct Reports {
    file: PathBuf,
    buffer_first: bool,
}

impl Reports {
    fn download(&self, ctx: &mut Context) -> Result<Outcome, Error> {
        if self.buffer_first {
            ctx.write(b"stray output");
        }
        let download = FileDownload::new(&self.file, "report.csv", ContentType::Csv).map_err(Error::Validation)?;
        Ok(Outcome::Download(download.with_size(17).map_err(Error::Validation)?))
    }
}

impl Controller for Reports {
    fn descriptor() -> Descriptor<Self> {
        Descriptor::new("download").method(MethodDescriptor::new("download", Self::download))
    }
}

struct Teapot;

impl Teapot {
    fn brew(&self, ctx: &mut Context) -> Result<Outcome, Error> {
        ctx.write(b"never sent");
        Ok(Outcome::status(StatusCode::IM_A_TEAPOT))
    }
}

impl Controller for Teapot {
    fn descriptor() -> Descriptor<Self> {
        Descriptor::new("brew").method(MethodDescriptor::new("brew", Self::brew))
    }
}

struct Search;

impl Search {
    fn run(&self, ctx: &mut Context) -> Result<Outcome, Error> {
        ctx.require_params()?;
        ctx.write(b"results");
        Ok(Outcome::Continue)
    }
}

impl Controller for Search {
    fn descriptor() -> Descriptor<Self> {
        Descriptor::new("run")
            .method(MethodDescriptor::new("run", Self::run).params(&[Param::required("q"), Param::optional("page")]))
    }
}

fn report_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"id,total\n1,42\n2,7\n").unwrap();
    file
}

// ── Normal path ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn normal_response_carries_payload_and_request_id() {
    let router = Router::new().on(Method::GET, "/hello", Hello);
    let res = router.dispatch(Request::new(Method::GET, "/hello?name=keel"), plain()).await;

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(header(&res, "content-type"), Some(ContentType::Text.as_str()));
    assert!(header(&res, REQUEST_ID_HEADER).is_some_and(|id| !id.is_empty()));
    assert_eq!(body(res).await, "hello keel");
}

#[tokio::test]
async fn each_request_gets_its_own_id() {
    let router = Router::new().on(Method::GET, "/hello", Hello);
    let a = router.dispatch(Request::new(Method::GET, "/hello"), plain()).await;
    let b = router.dispatch(Request::new(Method::GET, "/hello"), plain()).await;
    assert_ne!(header(&a, REQUEST_ID_HEADER), header(&b, REQUEST_ID_HEADER));
}

#[tokio::test]
async fn unknown_route_is_404() {
    let router = Router::new().on(Method::GET, "/hello", Hello);
    let res = router.dispatch(Request::new(Method::POST, "/hello"), plain()).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(header(&res, REQUEST_ID_HEADER).is_some());
}

// ── Interrupts ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn cache_hit_replays_stored_response_and_skips_finish() {
    let cache = Arc::new(MemoryCacheProvider::new());
    let router = Router::new().on(Method::GET, "/articles/{id}", Articles { cache: Arc::clone(&cache) });

    let first = router.dispatch(Request::new(Method::GET, "/articles/7"), plain()).await;
    assert_eq!(first.status(), StatusCode::OK);
    let first_id = header(&first, REQUEST_ID_HEADER).map(str::to_owned);
    let first_body = body(first).await;
    assert_eq!(ARTICLE_RENDERS.load(Ordering::SeqCst), 1);
    assert_eq!(ARTICLE_FINISHES.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 1);

    let second = router.dispatch(Request::new(Method::GET, "/articles/7"), plain()).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(header(&second, "x-rendered"), Some("fresh"));
    assert_eq!(header(&second, "cache-control"), Some("public, max-age=60, s-maxage=60"));
    assert_eq!(header(&second, "content-type"), Some(ContentType::Json.as_str()));
    assert_ne!(header(&second, REQUEST_ID_HEADER).map(str::to_owned), first_id);
    assert_eq!(body(second).await, first_body);

    assert_eq!(ARTICLE_RENDERS.load(Ordering::SeqCst), 1);
    assert_eq!(ARTICLE_FINISHES.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn download_streams_file_with_attachment_headers() {
    let file = report_file();
    let router = Router::new().on(Method::GET, "/report", Reports { file: file.path().to_owned(), buffer_first: false });

    let res = router.dispatch(Request::new(Method::GET, "/report"), plain()).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(header(&res, "content-type"), Some("text/csv"));
    assert_eq!(header(&res, "content-disposition"), Some("attachment; filename=report.csv"));
    assert_eq!(header(&res, "content-transfer-encoding"), Some("binary"));
    assert_eq!(header(&res, "pragma"), Some("public"));
    assert_eq!(header(&res, "expires"), Some("0"));
    assert_eq!(header(&res, "content-length"), Some("17"));
    assert!(header(&res, REQUEST_ID_HEADER).is_some());
    assert_eq!(body(res).await, "id,total\n1,42\n2,7\n");
}

#[tokio::test]
async fn download_after_buffered_output_is_a_server_error() {
    let file = report_file();
    let router = Router::new().on(Method::GET, "/report", Reports { file: file.path().to_owned(), buffer_first: true });

    let res = router.dispatch(Request::new(Method::GET, "/report"), plain()).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(header(&res, "content-disposition").is_none());
    assert!(body(res).await.is_empty());
}

#[tokio::test]
async fn finalized_outcome_discards_buffered_payload() {
    let router = Router::new().on(Method::GET, "/tea", Teapot);
    let res = router.dispatch(Request::new(Method::GET, "/tea"), plain()).await;
    assert_eq!(res.status(), StatusCode::IM_A_TEAPOT);
    assert!(header(&res, REQUEST_ID_HEADER).is_some());
    assert!(body(res).await.is_empty());
}

// ── Parameters and encoding ──────────────────────────────────────────────────

#[tokio::test]
async fn unrecognized_params_are_rejected_before_the_controller() {
    let router = Router::new().on(Method::GET, "/search", Search);

    let ok = router.dispatch(Request::new(Method::GET, "/search?q=rust&page=2"), plain()).await;
    assert_eq!(ok.status(), StatusCode::OK);

    let res = router.dispatch(Request::new(Method::GET, "/search?q=rust&debug=1"), plain()).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(body(res).await.is_empty());
}

#[tokio::test]
async fn missing_required_params_are_a_bad_request() {
    let router = Router::new().on(Method::GET, "/search", Search);
    let res = router.dispatch(Request::new(Method::GET, "/search?page=1"), plain()).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_percent_encoding_never_reaches_the_controller() {
    let router = Router::new().on(Method::GET, "/hello", Hello);
    let res = router.dispatch(Request::new(Method::GET, "/hello?name=%zz"), plain()).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(header(&res, REQUEST_ID_HEADER).is_some());
}

// ── Middleware resolution ────────────────────────────────────────────────────

#[tokio::test]
async fn tls_route_rejects_plain_http() {
    let router = Router::new()
        .provide(Scope::Route, TlsEnforcer::new())
        .on_requiring(Method::GET, "/secure", &[Contract::TLS], Hello)
        .on(Method::GET, "/open", Hello);
    assert!(router.verify().is_ok());

    let res = router.dispatch(Request::new(Method::GET, "/secure"), plain()).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = router.dispatch(Request::new(Method::GET, "/secure"), secure()).await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = router.dispatch(Request::new(Method::GET, "/open"), plain()).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn group_host_guard_rejects_other_hosts() {
    let router = Router::new()
        .provide(Scope::Group, HostGuard::new("admin.test"))
        .group("/admin", &[Contract::HOST], |g| g.on(Method::GET, "/hello", Hello));

    let res = router.dispatch(Request::new(Method::GET, "/admin/hello"), plain()).await;
    assert_eq!(res.status(), StatusCode::MISDIRECTED_REQUEST);

    let env = Environment::new("127.0.0.1".parse().unwrap(), "admin.test", 80, false);
    let res = router.dispatch(Request::new(Method::GET, "/admin/hello"), env).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body(res).await, "hello world");
}

#[tokio::test]
async fn missing_route_contract_fails_verification_and_requests() {
    let router = Router::new().on_requiring(Method::GET, "/secure", &[Contract::TLS], Hello);

    let err = router.verify().unwrap_err();
    assert_eq!(err.scope, Scope::Route);
    assert_eq!(err.contract, Contract::TLS);
    assert!(matches!(err.context, Reason::Missing));

    let res = router.dispatch(Request::new(Method::GET, "/secure"), secure()).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn two_providers_for_one_contract_are_ambiguous() {
    let router = Router::new()
        .provide(Scope::Route, TlsEnforcer::new())
        .provide(Scope::Route, TlsEnforcer::new())
        .on_requiring(Method::GET, "/secure", &[Contract::TLS], Hello);

    let err = router.verify().unwrap_err();
    match err.context {
        Reason::Ambiguous { candidates } => assert_eq!(candidates, vec!["tls", "tls"]),
        other => panic!("expected ambiguity, got {other:?}"),
    }

    let res = router.dispatch(Request::new(Method::GET, "/secure"), secure()).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn bare_router_cannot_resolve_the_kernel() {
    let router = Router::bare().on(Method::GET, "/hello", Hello);
    let err = router.verify().unwrap_err();
    assert_eq!(err.scope, Scope::Kernel);
    assert_eq!(err.contract, Contract::REQUEST_ID);

    let res = router.dispatch(Request::new(Method::GET, "/hello"), plain()).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(header(&res, REQUEST_ID_HEADER).is_none());
}

// Stands in for a second request-id source at route scope.
struct FixedRequestId(Arc<AtomicUsize>);

impl Middleware for FixedRequestId {
    fn contract(&self) -> Contract { Contract::REQUEST_ID }
    fn name(&self) -> &'static str { "fixed-request-id" }

    fn process(&self, ctx: &mut Context) -> Result<Outcome, Error> {
        self.0.fetch_add(1, Ordering::SeqCst);
        ctx.set_request_id("route-rid");
        Ok(Outcome::Continue)
    }
}

#[tokio::test]
async fn kernel_contracts_declared_again_are_satisfied_once() {
    let runs = Arc::new(AtomicUsize::new(0));
    let router = Router::new()
        .provide(Scope::Route, FixedRequestId(Arc::clone(&runs)))
        .on_requiring(Method::GET, "/hello", &[Contract::REQUEST_ID], Hello)
        .group("/admin", &[Contract::CLIENT_IP], |g| g.on(Method::GET, "/hello", Hello));
    router.verify().unwrap();

    let res = router.dispatch(Request::new(Method::GET, "/hello"), plain()).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    let id = header(&res, REQUEST_ID_HEADER).unwrap();
    assert_ne!(id, "route-rid");
    assert_eq!(id.len(), 36);

    // No group-scope client-ip provider exists; the kernel one suffices.
    let res = router.dispatch(Request::new(Method::GET, "/admin/hello"), plain()).await;
    assert_eq!(res.status(), StatusCode::OK);
}
