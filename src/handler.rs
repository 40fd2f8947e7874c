//! Handler trait and type erasure.
//!
//! # How controllers are stored
//!
//! The router holds controllers of *different* types behind one route table.
//! Rust collections can only hold one concrete type, so each controller is
//! wrapped in a [`ControllerHandler`] and stored as a trait object
//! (`dyn ErasedHandler`).
//!
//! ```text
//! impl Controller for Users { … }                   ← user writes this
//!        ↓ router.on(Method::GET, "/users/{id}", Users)
//! Users.into_boxed_handler()                       ← Handler blanket impl
//!        ↓ attributes_for::<Users>()               ← validated once, cached
//! Arc::new(ControllerHandler { … })                ← entrypoint fn resolved
//!        ↓ stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(&mut ctx)  at request time          ← one vtable dispatch
//! ```
//!
//! The entrypoint is looked up by name once, at registration. At request
//! time the handler calls a plain function pointer.

use std::sync::Arc;

use crate::context::Context;
use crate::controller::{Action, Controller, ControllerAttributes, attributes_for};
use crate::error::{Error, ValidationError};
use crate::interrupt::Outcome;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler: Send + Sync {
    fn attributes(&self) -> &Arc<ControllerAttributes>;
    fn call(&self, ctx: &mut Context) -> Result<Outcome, Error>;
    fn finish(&self, ctx: &mut Context);
}

/// A type-erased controller shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + 'static>;

/// Implemented for every [`Controller`].
///
/// The trait is **sealed**: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> Result<BoxedHandler, ValidationError>;
}

mod private {
    pub trait Sealed {}
}

impl<C: Controller> private::Sealed for C {}

impl<C: Controller> Handler for C {
    fn into_boxed_handler(self) -> Result<BoxedHandler, ValidationError> {
        Ok(Arc::new(ControllerHandler::new(self)?))
    }
}

/// Bridges a concrete controller to the trait-object world.
struct ControllerHandler<C> {
    controller: C,
    entrypoint: Action<C>,
    attributes: Arc<ControllerAttributes>,
}

impl<C: Controller> ControllerHandler<C> {
    fn new(controller: C) -> Result<Self, ValidationError> {
        let attributes = attributes_for::<C>()?;
        let entrypoint = C::descriptor()
            .action(attributes.entrypoint())
            .ok_or_else(|| ValidationError::UnknownEntrypoint {
                controller: attributes.controller(),
                entrypoint: attributes.entrypoint().to_owned(),
            })?;
        Ok(Self { controller, entrypoint, attributes })
    }
}

impl<C: Controller> ErasedHandler for ControllerHandler<C> {
    fn attributes(&self) -> &Arc<ControllerAttributes> { &self.attributes }

    fn call(&self, ctx: &mut Context) -> Result<Outcome, Error> {
        (self.entrypoint)(&self.controller, ctx)
    }

    fn finish(&self, ctx: &mut Context) {
        self.controller.finish(ctx);
    }
}
