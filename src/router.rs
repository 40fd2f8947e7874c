//! Radix-tree request router with scoped middleware.
//!
//! One tree per HTTP method, O(path-length) lookup. Besides the controller,
//! every route knows which contracts its group and the route itself
//! require. The middleware that can satisfy them is provided per scope.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use matchit::Router as MatchitRouter;

use crate::config::Settings;
use crate::environment::EnvironmentPolicy;
use crate::error::ResolutionError;
use crate::handler::{BoxedHandler, Handler};
use crate::hooks::Hooks;
use crate::middleware::{
    BoxedMiddleware, ClientIpResolver, Contract, Middleware, RequestIdResolver, ResolvedPipeline, Scope,
    UrlEncodingEnforcer, resolve,
};

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Every builder call returns `self` so registrations chain naturally.
///
/// ```rust,ignore
/// Router::new()
///     .provide(Scope::Route, TlsEnforcer::new())
///     .on(Method::GET, "/users/{id}", Users)
///     .on_requiring(Method::POST, "/users", &[Contract::TLS], Users)
///     .group("/admin", &[Contract::HOST], |g| g.on(Method::GET, "/stats", Stats));
/// ```
pub struct Router {
    routes: HashMap<Method, MatchitRouter<usize>>,
    entries: Vec<RouteEntry>,
    groups: Vec<Vec<Contract>>,
    available: HashMap<Scope, Vec<BoxedMiddleware>>,
    pub(crate) hooks: Arc<Hooks>,
    pub(crate) policy: EnvironmentPolicy,
}

pub(crate) struct RouteEntry {
    pub(crate) handler: BoxedHandler,
    method: Method,
    pattern: String,
    group: Option<usize>,
    contracts: Vec<Contract>,
}

impl Router {
    /// A router with the built-in kernel middleware.
    pub fn new() -> Self {
        Self::bare()
            .provide(Scope::Kernel, RequestIdResolver::new())
            .provide(Scope::Kernel, UrlEncodingEnforcer::new())
            .provide(Scope::Kernel, ClientIpResolver::new())
    }

    /// A router with no middleware at all. Every kernel contract has to be
    /// provided before requests can resolve.
    pub fn bare() -> Self {
        Self {
            routes: HashMap::new(),
            entries: Vec::new(),
            groups: Vec::new(),
            available: HashMap::new(),
            hooks: Arc::new(Hooks::default()),
            policy: EnvironmentPolicy::default(),
        }
    }

    /// Kernel middleware and environment policy configured from `settings`.
    pub fn with_settings(settings: &Settings) -> Self {
        let request_id = if settings.trust_request_id {
            RequestIdResolver::trust_incoming()
        } else {
            RequestIdResolver::new()
        };
        Self::bare()
            .provide(Scope::Kernel, request_id)
            .provide(Scope::Kernel, UrlEncodingEnforcer::new())
            .provide(Scope::Kernel, ClientIpResolver::trusting(settings.trusted_proxies.clone()))
            .policy(settings.policy())
    }

    /// Make `middleware` available to every pipeline at `scope`.
    pub fn provide(mut self, scope: Scope, middleware: impl Middleware) -> Self {
        self.available.entry(scope).or_default().push(Arc::new(middleware));
        self
    }

    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Checked against every request before the kernel pipeline runs.
    pub fn policy(mut self, policy: EnvironmentPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Register a controller for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax.
    ///
    /// # Panics
    ///
    /// Panics on an invalid or conflicting path, or when the controller's
    /// declared entrypoint is malformed.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.on_requiring(method, path, &[], handler)
    }

    /// Like [`on`](Self::on), with route-scope contracts.
    pub fn on_requiring(self, method: Method, path: &str, contracts: &[Contract], handler: impl Handler) -> Self {
        let handler = boxed(path, handler);
        self.add(method, path.to_owned(), None, contracts.to_vec(), handler)
    }

    /// Routes sharing a path prefix and group-scope contracts.
    pub fn group(mut self, prefix: &str, contracts: &[Contract], build: impl FnOnce(Group) -> Group) -> Self {
        let index = self.groups.len();
        self.groups.push(contracts.to_vec());

        let group = build(Group { prefix: prefix.trim_end_matches('/').to_owned(), routes: Vec::new() });
        for (method, path, contracts, handler) in group.routes {
            self = self.add(method, path, Some(index), contracts, handler);
        }
        self
    }

    fn add(
        mut self,
        method: Method,
        path: String,
        group: Option<usize>,
        contracts: Vec<Contract>,
        handler: BoxedHandler,
    ) -> Self {
        let index = self.entries.len();
        self.routes
            .entry(method.clone())
            .or_default()
            .insert(path.clone(), index)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self.entries.push(RouteEntry { handler, method, pattern: path, group, contracts });
        self
    }

    /// Resolves the kernel pipeline and every route's pipelines.
    ///
    /// [`Server::serve`](crate::Server::serve) runs this before accepting
    /// connections.
    pub fn verify(&self) -> Result<(), ResolutionError> {
        self.kernel_pipeline()?;
        for entry in &self.entries {
            self.route_pipeline(entry)?;
        }
        Ok(())
    }

    fn available(&self, scope: Scope) -> &[BoxedMiddleware] {
        self.available.get(&scope).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn kernel_pipeline(&self) -> Result<ResolvedPipeline, ResolutionError> {
        resolve(Scope::Kernel, &Scope::Kernel.required_contracts(&[]), self.available(Scope::Kernel))
    }

    /// Group scope, then route scope.
    ///
    /// Kernel contracts are already satisfied by the time this pipeline
    /// runs; declaring one at group or route scope is a no-op.
    pub(crate) fn route_pipeline(&self, entry: &RouteEntry) -> Result<ResolvedPipeline, ResolutionError> {
        let declared = entry.group.and_then(|g| self.groups.get(g)).map(Vec::as_slice).unwrap_or(&[]);
        let group = Scope::Group.required_contracts(&beyond_kernel(declared));
        let route = Scope::Route.required_contracts(&beyond_kernel(&entry.contracts));

        let mut pipeline = resolve(Scope::Group, &group, self.available(Scope::Group))?;
        pipeline.extend(resolve(Scope::Route, &route, self.available(Scope::Route))?);
        Ok(pipeline)
    }

    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Option<(&RouteEntry, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let entry = self.entries.get(*matched.value)?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((entry, params))
    }

    /// Registered `(method, pattern)` pairs, in registration order.
    pub fn routes(&self) -> Vec<(&Method, &str)> {
        self.entries.iter().map(|e| (&e.method, e.pattern.as_str())).collect()
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

fn beyond_kernel(declared: &[Contract]) -> Vec<Contract> {
    let kernel = Scope::Kernel.registered_contracts();
    declared.iter().copied().filter(|c| !kernel.contains(c)).collect()
}

fn boxed(path: &str, handler: impl Handler) -> BoxedHandler {
    handler.into_boxed_handler()
        .unwrap_or_else(|e| panic!("invalid controller for `{path}`: {e}"))
}

/// Routes registered inside [`Router::group`].
pub struct Group {
    prefix: String,
    routes: Vec<(Method, String, Vec<Contract>, BoxedHandler)>,
}

impl Group {
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.on_requiring(method, path, &[], handler)
    }

    pub fn on_requiring(mut self, method: Method, path: &str, contracts: &[Contract], handler: impl Handler) -> Self {
        let full = match path {
            "" | "/" if !self.prefix.is_empty() => self.prefix.clone(),
            _ => format!("{}{}", self.prefix, path),
        };
        let handler = boxed(&full, handler);
        self.routes.push((method, full, contracts.to_vec(), handler));
        self
    }
}
