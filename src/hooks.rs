//! Optional validation callbacks.
//!
//! Both hooks fire on validation failures only: a header the transport
//! cannot carry, a request whose parameters or encoding were rejected.
//! Interrupts never reach them.

use std::fmt;
use std::sync::Arc;

/// What went wrong, handed to a hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub request_id: Option<String>,
    /// The header name, parameter list or URL part that failed.
    pub subject: String,
    pub reason: String,
}

pub type Callback = Arc<dyn Fn(&Diagnostic) + Send + Sync + 'static>;

/// `on_invalid_header` / `on_invalid_payload` callbacks. Both default to absent.
#[derive(Clone, Default)]
pub struct Hooks {
    on_invalid_header: Option<Callback>,
    on_invalid_payload: Option<Callback>,
}

impl Hooks {
    pub fn new() -> Self { Self::default() }

    pub fn on_invalid_header(mut self, f: impl Fn(&Diagnostic) + Send + Sync + 'static) -> Self {
        self.on_invalid_header = Some(Arc::new(f));
        self
    }

    pub fn on_invalid_payload(mut self, f: impl Fn(&Diagnostic) + Send + Sync + 'static) -> Self {
        self.on_invalid_payload = Some(Arc::new(f));
        self
    }

    pub(crate) fn invalid_header(&self, diagnostic: &Diagnostic) {
        if let Some(f) = &self.on_invalid_header {
            f(diagnostic);
        }
    }

    pub(crate) fn invalid_payload(&self, diagnostic: &Diagnostic) {
        if let Some(f) = &self.on_invalid_payload {
            f(diagnostic);
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_invalid_header", &self.on_invalid_header.is_some())
            .field("on_invalid_payload", &self.on_invalid_payload.is_some())
            .finish()
    }
}
