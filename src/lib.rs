//! # keel
//!
//! The request-processing core of an HTTP framework for services behind a
//! reverse proxy: scoped middleware with contract resolution, controllers
//! with declared parameters, explicit short-circuit outcomes, response
//! caching and file downloads.
//!
//! ## Request lifecycle
//!
//! Every request runs three middleware scopes, then the controller:
//!
//! - **kernel**: request id, URL-encoding check, client IP. Always on.
//! - **group**: whatever the route's [`Router::group`] requires.
//! - **route**: whatever the route itself requires.
//!
//! A scope's pipeline is built from the contracts it requires and the
//! middleware [`provided`](Router::provide) for it. Zero candidates or more
//! than one for a contract is an error, caught by [`Router::verify`] at
//! startup.
//!
//! Any stage may end the request early by returning a terminal
//! [`Outcome`]: a cached result, a file download, or a finalized response.
//! All paths, failures included, leave through the same header-assignment
//! step, so `x-request-id` is always present once it has been resolved.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::Method;
//! use keel::{Context, Controller, Descriptor, Error, MethodDescriptor, Outcome, Param, Router, Server};
//!
//! struct Users;
//!
//! impl Users {
//!     fn show(&self, ctx: &mut Context) -> Result<Outcome, Error> {
//!         let id = ctx.param("id").unwrap_or("unknown").to_owned();
//!         ctx.set_content_type(keel::ContentType::Json);
//!         ctx.write(format!(r#"{{"id":"{id}"}}"#).as_bytes());
//!         Ok(Outcome::Continue)
//!     }
//! }
//!
//! impl Controller for Users {
//!     fn descriptor() -> Descriptor<Self> {
//!         Descriptor::new("show")
//!             .method(MethodDescriptor::new("show", Self::show).params(&[Param::optional("fields")]))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new().on(Method::GET, "/users/{id}", Users);
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//! ```

mod cache_control;
mod config;
mod context;
mod controller;
mod dispatcher;
mod environment;
mod error;
mod handler;
mod hooks;
mod interrupt;
mod request;
mod response;
mod router;
mod server;

pub mod cache;
pub mod middleware;

pub use cache_control::{CacheControl, SharedMaxAge, StoreDirective};
pub use config::Settings;
pub use context::Context;
pub use controller::{Action, Controller, ControllerAttributes, Descriptor, MethodDescriptor, Param, attributes_for};
pub use environment::{Environment, EnvironmentPolicy};
pub use error::{EnvironmentError, Error, Reason, ResolutionError, ValidationError};
pub use handler::Handler;
pub use hooks::{Callback, Diagnostic, Hooks};
pub use interrupt::{EmissionKind, FileDownload, Finalize, Outcome, Phase};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBody, ResponseBuilder};
pub use router::{Group, Router};
pub use server::Server;
