//! Controllers and their static dispatch metadata.
//!
//! A controller declares, once, which of its methods is the entrypoint and
//! which parameters each method accepts:
//!
//! ```rust
//! use keel::{Context, Controller, Descriptor, Error, MethodDescriptor, Outcome, Param};
//!
//! struct Users;
//!
//! impl Users {
//!     fn show(&self, ctx: &mut Context) -> Result<Outcome, Error> {
//!         ctx.require_params()?;
//!         ctx.write(b"alice");
//!         Ok(Outcome::Continue)
//!     }
//! }
//!
//! impl Controller for Users {
//!     fn descriptor() -> Descriptor<Self> {
//!         Descriptor::new("show")
//!             .method(MethodDescriptor::new("show", Self::show).params(&[Param::required("id")]))
//!     }
//! }
//! ```
//!
//! The declaration is turned into [`ControllerAttributes`] the first time
//! the controller is registered and then cached for the life of the
//! process. A malformed entrypoint name fails there, at registration,
//! never while serving a request.

use std::any::{TypeId, type_name};
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use regex::Regex;
use tracing::debug;

use crate::context::Context;
use crate::error::{Error, ValidationError};
use crate::interrupt::Outcome;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern"));

static ATTRIBUTES: LazyLock<DashMap<TypeId, Arc<ControllerAttributes>>> = LazyLock::new(DashMap::new);

/// A controller method.
pub type Action<C> = fn(&C, &mut Context) -> Result<Outcome, Error>;

/// A type whose requests keel can dispatch.
pub trait Controller: Send + Sync + 'static {
    /// Static metadata: entrypoint and method table.
    fn descriptor() -> Descriptor<Self>
    where
        Self: Sized;

    /// Post-processing after the entrypoint returned `Continue`. Never
    /// called when the request ended in a cached, download or finalized
    /// outcome.
    fn finish(&self, _ctx: &mut Context) {}
}

/// A parameter a method expects in the query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
    name: &'static str,
    required: bool,
}

impl Param {
    pub const fn required(name: &'static str) -> Self { Self { name, required: true } }
    pub const fn optional(name: &'static str) -> Self { Self { name, required: false } }

    pub fn name(&self) -> &'static str { self.name }
    pub fn is_required(&self) -> bool { self.required }
}

/// One entry of a controller's method table.
pub struct MethodDescriptor<C> {
    name: &'static str,
    action: Action<C>,
    params: Vec<Param>,
    reject_unrecognized: bool,
}

impl<C> MethodDescriptor<C> {
    /// Rejects unrecognized parameters unless told otherwise.
    pub fn new(name: &'static str, action: Action<C>) -> Self {
        Self { name, action, params: Vec::new(), reject_unrecognized: true }
    }

    pub fn params(mut self, params: &[Param]) -> Self {
        self.params = params.to_vec();
        self
    }

    /// Let callers pass query parameters this method does not declare.
    pub fn allow_unrecognized_params(mut self) -> Self {
        self.reject_unrecognized = false;
        self
    }
}

/// Everything a controller declares about itself.
pub struct Descriptor<C> {
    entrypoint: &'static str,
    methods: Vec<MethodDescriptor<C>>,
}

impl<C> Descriptor<C> {
    pub fn new(entrypoint: &'static str) -> Self {
        Self { entrypoint, methods: Vec::new() }
    }

    pub fn method(mut self, method: MethodDescriptor<C>) -> Self {
        self.methods.push(method);
        self
    }

    fn find(&self, name: &str) -> Option<&MethodDescriptor<C>> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub(crate) fn action(&self, name: &str) -> Option<Action<C>> {
        self.find(name).map(|m| m.action)
    }
}

/// Dispatch metadata derived from a [`Descriptor`]. Immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerAttributes {
    controller: &'static str,
    entrypoint: String,
    reject_unrecognized_params: bool,
    params: Vec<Param>,
}

impl ControllerAttributes {
    pub fn controller(&self) -> &'static str { self.controller }
    pub fn entrypoint(&self) -> &str { &self.entrypoint }
    pub fn reject_unrecognized_params(&self) -> bool { self.reject_unrecognized_params }
    pub fn params(&self) -> &[Param] { &self.params }

    pub fn is_declared(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name)
    }
}

/// Validated identifier: non-empty after trimming, `[A-Za-z_][A-Za-z0-9_]*`.
fn identifier(field: &'static str, raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if !IDENTIFIER.is_match(trimmed) {
        return Err(ValidationError::Identifier { field, value: raw.to_owned() });
    }
    Ok(trimmed.to_owned())
}

fn derive<C>(descriptor: &Descriptor<C>) -> Result<ControllerAttributes, ValidationError> {
    let controller = type_name::<C>();
    let entrypoint = identifier("entrypoint", descriptor.entrypoint)?;
    for method in &descriptor.methods {
        identifier("method", method.name)?;
    }

    let method = descriptor.find(&entrypoint).ok_or_else(|| ValidationError::UnknownEntrypoint {
        controller,
        entrypoint: entrypoint.clone(),
    })?;

    Ok(ControllerAttributes {
        controller,
        entrypoint,
        reject_unrecognized_params: method.reject_unrecognized,
        params: method.params.clone(),
    })
}

/// Attributes for `C`, derived on first use and shared afterwards.
///
/// Concurrent first calls may each derive; the first insert wins and every
/// caller receives that same `Arc`. Failures are not cached.
pub fn attributes_for<C: Controller>() -> Result<Arc<ControllerAttributes>, ValidationError> {
    let id = TypeId::of::<C>();
    if let Some(cached) = ATTRIBUTES.get(&id) {
        return Ok(Arc::clone(cached.value()));
    }

    let derived = Arc::new(derive(&C::descriptor())?);
    debug!(controller = derived.controller(), entrypoint = derived.entrypoint(), "controller attributes derived");
    Ok(Arc::clone(ATTRIBUTES.entry(id).or_insert(derived).value()))
}
