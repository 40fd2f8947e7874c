//! Controllers, scoped middleware, caching and downloads.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/articles/42
//!   curl -i http://localhost:3000/articles/42          # served from cache
//!   curl -i 'http://localhost:3000/search?q=rust'
//!   curl -i 'http://localhost:3000/search?q=rust&x=1'  # 400, unrecognized
//!   curl -i http://localhost:3000/export/Cargo.toml
//!   curl -i http://localhost:3000/admin/stats          # 421 unless Host is admin.localhost

use std::path::PathBuf;
use std::sync::Arc;

use http::{Method, StatusCode};
use keel::cache::{CachedResponsePointer, MemoryCacheProvider};
use keel::middleware::{Contract, HostGuard, Scope};
use keel::{
    CacheControl, ContentType, Context, Controller, Descriptor, Error, FileDownload, MethodDescriptor, Outcome, Param,
    Router, Server, Settings, StoreDirective,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let settings = Settings::from_env().expect("invalid KEEL_* settings");
    let cache = Arc::new(MemoryCacheProvider::new());

    let app = Router::with_settings(&settings)
        .provide(Scope::Group, HostGuard::new("admin.localhost"))
        .on(Method::GET, "/articles/{id}", Articles { cache })
        .on(Method::GET, "/search", Search)
        .on(Method::GET, "/export/{file}", Export { root: PathBuf::from(".") })
        .group("/admin", &[Contract::HOST], |g| g.on(Method::GET, "/stats", Stats));

    Server::with_settings(settings)
        .serve(app)
        .await
        .expect("server error");
}

// GET /articles/{id}: rendered once, then replayed from the cache for 60 s.
struct Articles {
    cache: Arc<MemoryCacheProvider>,
}

impl Articles {
    fn show(&self, ctx: &mut Context) -> Result<Outcome, Error> {
        let id = ctx.param("id").unwrap_or_default().to_owned();
        let pointer = CachedResponsePointer::new(format!("article:{id}"), ["articles"], 60)?;
        if let Some(hit) = ctx.cached(self.cache.as_ref(), &pointer) {
            return Ok(hit);
        }

        let body = serde_json::json!({ "id": id, "title": "Hello" });
        ctx.set_content_type(ContentType::Json);
        ctx.set_cache_control(CacheControl::new(StoreDirective::Public).max_age(60));
        ctx.write(body.to_string().as_bytes());
        ctx.store(self.cache.as_ref(), &pointer);
        Ok(Outcome::Continue)
    }
}

impl Controller for Articles {
    fn descriptor() -> Descriptor<Self> {
        Descriptor::new("show").method(MethodDescriptor::new("show", Self::show))
    }
}

// GET /search?q=..&page=..
struct Search;

impl Search {
    fn run(&self, ctx: &mut Context) -> Result<Outcome, Error> {
        ctx.require_params()?;
        let q = ctx.query("q").unwrap_or_default();
        let page = ctx.query("page").and_then(|p| p.parse::<u32>().ok()).unwrap_or(1);
        ctx.set_content_type(ContentType::Json);
        ctx.write(serde_json::json!({ "q": q, "page": page, "hits": [] }).to_string().as_bytes());
        Ok(Outcome::Continue)
    }
}

impl Controller for Search {
    fn descriptor() -> Descriptor<Self> {
        Descriptor::new("run")
            .method(MethodDescriptor::new("run", Self::run).params(&[Param::required("q"), Param::optional("page")]))
    }
}

// GET /export/{file}: streams a file from the working directory.
struct Export {
    root: PathBuf,
}

impl Export {
    fn download(&self, ctx: &mut Context) -> Result<Outcome, Error> {
        let name = ctx.param("file").unwrap_or_default().to_owned();
        if name.contains("..") {
            return Ok(Outcome::status(StatusCode::FORBIDDEN));
        }
        match FileDownload::new(self.root.join(&name), name, ContentType::OctetStream) {
            Ok(download) => Ok(download.into()),
            Err(_) => Ok(Outcome::status(StatusCode::NOT_FOUND)),
        }
    }
}

impl Controller for Export {
    fn descriptor() -> Descriptor<Self> {
        Descriptor::new("download").method(MethodDescriptor::new("download", Self::download))
    }
}

// GET /admin/stats: only for Host: admin.localhost.
struct Stats;

impl Stats {
    fn show(&self, ctx: &mut Context) -> Result<Outcome, Error> {
        ctx.write(format!("client {}", ctx.client_ip()).as_bytes());
        Ok(Outcome::Continue)
    }
}

impl Controller for Stats {
    fn descriptor() -> Descriptor<Self> {
        Descriptor::new("show").method(MethodDescriptor::new("show", Self::show))
    }
}
