//! `Cache-Control` header model.
//!
//! ```rust
//! use keel::{CacheControl, StoreDirective};
//!
//! let cc = CacheControl::new(StoreDirective::Public).max_age(3600);
//! assert_eq!(cc.header_value(), "public, max-age=3600, s-maxage=3600");
//! ```
//!
//! Serialization order is fixed: store directive, `max-age`, `s-maxage`,
//! `must-revalidate`, `no-cache`, `immutable`, `no-transform`, then custom
//! directives in the order they were added.

use std::fmt;

use crate::error::ValidationError;

/// Who may store the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreDirective {
    Public,
    Private,
    NoStore,
}

impl StoreDirective {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public  => "public",
            Self::Private => "private",
            Self::NoStore => "no-store",
        }
    }
}

/// What to emit for `s-maxage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SharedMaxAge {
    /// Mirror `max-age` when it is set.
    #[default]
    Inherit,
    Seconds(u32),
    /// Never emit `s-maxage`, even when `max-age` is set.
    Omit,
}

/// A `Cache-Control` value assembled before response emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheControl {
    store: StoreDirective,
    max_age: Option<u32>,
    s_max_age: SharedMaxAge,
    must_revalidate: bool,
    no_cache: bool,
    immutable: bool,
    no_transform: bool,
    custom: Vec<String>,
}

impl CacheControl {
    pub fn new(store: StoreDirective) -> Self {
        Self {
            store,
            max_age: None,
            s_max_age: SharedMaxAge::Inherit,
            must_revalidate: false,
            no_cache: false,
            immutable: false,
            no_transform: false,
            custom: Vec::new(),
        }
    }

    pub fn max_age(mut self, seconds: u32) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn s_max_age(mut self, seconds: u32) -> Self {
        self.s_max_age = SharedMaxAge::Seconds(seconds);
        self
    }

    pub fn omit_s_max_age(mut self) -> Self {
        self.s_max_age = SharedMaxAge::Omit;
        self
    }

    pub fn must_revalidate(mut self) -> Self {
        self.must_revalidate = true;
        self
    }

    pub fn no_cache(mut self) -> Self {
        self.no_cache = true;
        self
    }

    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    pub fn no_transform(mut self) -> Self {
        self.no_transform = true;
        self
    }

    /// Append a custom directive, emitted verbatim after the built-in ones.
    ///
    /// Fails on empty input, commas, or anything outside visible ASCII and
    /// spaces.
    pub fn directive(mut self, directive: impl Into<String>) -> Result<Self, ValidationError> {
        let directive = directive.into();
        let trimmed = directive.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Length { field: "cache directive", len: 0, min: 1, max: usize::MAX });
        }
        if trimmed.contains(',') || !trimmed.bytes().all(|b| b == b' ' || b.is_ascii_graphic()) {
            return Err(ValidationError::Charset {
                field: "cache directive",
                value: directive.clone(),
                allowed: "visible ASCII without commas",
            });
        }
        self.custom.push(trimmed.to_owned());
        Ok(self)
    }

    pub fn store(&self) -> StoreDirective { self.store }
    pub fn get_max_age(&self) -> Option<u32> { self.max_age }

    /// The `s-maxage` value that will actually be emitted.
    pub fn effective_s_max_age(&self) -> Option<u32> {
        match self.s_max_age {
            SharedMaxAge::Inherit    => self.max_age,
            SharedMaxAge::Seconds(s) => Some(s),
            SharedMaxAge::Omit       => None,
        }
    }

    pub fn header_value(&self) -> String {
        let mut parts: Vec<String> = vec![self.store.as_str().to_owned()];
        if let Some(max_age) = self.max_age {
            parts.push(format!("max-age={max_age}"));
        }
        if let Some(s_max_age) = self.effective_s_max_age() {
            parts.push(format!("s-maxage={s_max_age}"));
        }
        let flags = [
            (self.must_revalidate, "must-revalidate"),
            (self.no_cache,        "no-cache"),
            (self.immutable,       "immutable"),
            (self.no_transform,    "no-transform"),
        ];
        parts.extend(flags.iter().filter(|(on, _)| *on).map(|(_, name)| (*name).to_owned()));
        parts.extend(self.custom.iter().cloned());
        parts.join(", ")
    }
}

impl fmt::Display for CacheControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header_value())
    }
}
