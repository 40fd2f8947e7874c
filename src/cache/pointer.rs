//! Validated cache slot identifier.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

static UNIQUE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9\-:_.+@]+$").expect("unique id pattern"));
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9\-_]+$").expect("tag pattern"));

/// Identifies one cacheable response slot.
///
/// Every field is checked once, here. Providers receive pointers that are
/// already well-formed and never re-validate them.
///
/// | Field | Length | Characters |
/// |---|---|---|
/// | `unique_id` | 3–128 | `A-Z a-z 0-9 - : _ . + @` |
/// | each namespace | 2–40 | `A-Z a-z 0-9 - _` |
/// | `integrity_tag` | 2–40 | `A-Z a-z 0-9 - _` |
///
/// `validity` is in seconds, `0..=31_536_000` (one year).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PointerFields", into = "PointerFields")]
pub struct CachedResponsePointer {
    unique_id: String,
    namespaces: Vec<String>,
    validity: u32,
    integrity_tag: Option<String>,
}

impl CachedResponsePointer {
    pub const MAX_VALIDITY: i64 = 31_536_000;

    pub fn new<I, S>(unique_id: impl Into<String>, namespaces: I, validity: i64) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let unique_id = unique_id.into();
        check(&unique_id, "unique_id", 3, 128, &UNIQUE_ID, "[A-Za-z0-9-:_.+@]")?;

        let namespaces = namespaces.into_iter().map(Into::into).collect::<Vec<String>>();
        for ns in &namespaces {
            check(ns, "namespace", 2, 40, &TAG, "[A-Za-z0-9-_]")?;
        }

        if !(0..=Self::MAX_VALIDITY).contains(&validity) {
            return Err(ValidationError::Range {
                field: "validity",
                value: validity,
                min: 0,
                max: Self::MAX_VALIDITY,
            });
        }

        Ok(Self {
            unique_id,
            namespaces,
            // Range-checked above.
            validity: validity as u32,
            integrity_tag: None,
        })
    }

    /// Attach an integrity tag; a provider only returns a hit when the
    /// stored tag matches.
    pub fn with_integrity_tag(mut self, tag: impl Into<String>) -> Result<Self, ValidationError> {
        let tag = tag.into();
        check(&tag, "integrity_tag", 2, 40, &TAG, "[A-Za-z0-9-_]")?;
        self.integrity_tag = Some(tag);
        Ok(self)
    }

    pub fn unique_id(&self) -> &str { &self.unique_id }
    pub fn namespaces(&self) -> &[String] { &self.namespaces }
    pub fn validity(&self) -> u32 { self.validity }
    pub fn integrity_tag(&self) -> Option<&str> { self.integrity_tag.as_deref() }
}

fn check(
    value: &str,
    field: &'static str,
    min: usize,
    max: usize,
    pattern: &Regex,
    allowed: &'static str,
) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(ValidationError::Length { field, len, min, max });
    }
    if !pattern.is_match(value) {
        return Err(ValidationError::Charset { field, value: value.to_owned(), allowed });
    }
    Ok(())
}

// ── serde projection ──────────────────────────────────────────────────────────

/// Wire shape of a pointer. Deserialization funnels through
/// [`CachedResponsePointer::new`] so it cannot bypass validation.
#[derive(Serialize, Deserialize)]
struct PointerFields {
    unique_id: String,
    #[serde(default)]
    namespaces: Vec<String>,
    validity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    integrity_tag: Option<String>,
}

impl TryFrom<PointerFields> for CachedResponsePointer {
    type Error = ValidationError;

    fn try_from(fields: PointerFields) -> Result<Self, Self::Error> {
        let pointer = Self::new(fields.unique_id, fields.namespaces, fields.validity)?;
        match fields.integrity_tag {
            Some(tag) => pointer.with_integrity_tag(tag),
            None => Ok(pointer),
        }
    }
}

impl From<CachedResponsePointer> for PointerFields {
    fn from(p: CachedResponsePointer) -> Self {
        Self {
            unique_id: p.unique_id,
            namespaces: p.namespaces,
            validity: i64::from(p.validity),
            integrity_tag: p.integrity_tag,
        }
    }
}
