//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown
//!
//! On **SIGTERM** (or Ctrl-C) the server:
//! 1. stops `listener.accept()` right away, so no new connections come in;
//! 2. lets every in-flight connection task run to completion;
//! 3. returns from [`Server::serve`].
//!
//! Give the orchestrator's grace period more time than your slowest request.
//!
//! # Startup checks
//!
//! [`Server::serve`] resolves every pipeline the router can build before
//! binding. A missing or ambiguous middleware contract is a startup error,
//! not a stream of 500s.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http::StatusCode;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::environment::Environment;
use crate::error::Error;
use crate::request::Request;
use crate::response::{ResponseBody, empty_body};
use crate::router::Router;

/// The HTTP server.
pub struct Server {
    settings: Settings,
}

impl Server {
    /// Serve on `addr` with default settings.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    ///
    /// ```rust,no_run
    /// use keel::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self::with_settings(Settings { addr, ..Settings::default() })
    }

    /// Address and trusted proxies come from `settings`. Pair with
    /// [`Router::with_settings`] so the kernel stages and environment
    /// policy agree with the server.
    pub fn with_settings(settings: Settings) -> Self {
        Self { settings }
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns only after a full graceful shutdown.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        router.verify()?;

        let addr = self.settings.addr;
        let listener = TcpListener::bind(addr).await?;
        let router = Arc::new(router);
        let trusted = Arc::new(self.settings.trusted_proxies);

        info!(%addr, routes = router.routes().len(), "keel listening");

        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Shutdown first, so a SIGTERM stops accepting even while
                // connections are queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let trusted = Arc::clone(&trusted);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        let svc = service_fn(move |req| {
                            let router = Arc::clone(&router);
                            let trusted = Arc::clone(&trusted);
                            async move { handle(&router, req, remote, &trusted).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote, "connection error: {e}");
                        }
                    });
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("keel stopped");
        Ok(())
    }
}

/// Buffers the request body, snapshots the environment and hands both to
/// the router. Never fails.
async fn handle(
    router: &Router,
    req: hyper::Request<Incoming>,
    remote: SocketAddr,
    trusted: &[std::net::IpAddr],
) -> Result<http::Response<ResponseBody>, Infallible> {
    let (parts, incoming) = req.into_parts();
    let env = Environment::from_parts(&parts, remote, trusted);

    let body = match incoming.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(peer = %remote, "failed to read request body: {e}");
            let mut res = http::Response::new(empty_body());
            *res.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(res);
        }
    };

    Ok(router.dispatch(Request::from_parts(parts, body), env).await)
}

/// Resolves on the first shutdown signal the process receives: SIGTERM or
/// SIGINT on Unix, Ctrl-C elsewhere.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
