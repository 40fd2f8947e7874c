use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A stored response: status, headers and body as they were emitted, plus
/// the provider timestamp at which they were stored.
///
/// Immutable once built. Staleness is the provider's call, comparing the
/// pointer's validity against [`stored_at`](Self::stored_at).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ResultFields", into = "ResultFields")]
pub struct CachedResult {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    stored_at: u64,
}

impl CachedResult {
    pub fn new(status: StatusCode, headers: Vec<(String, String)>, body: Vec<u8>, stored_at: u64) -> Self {
        Self { status, headers, body, stored_at }
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn stored_at(&self) -> u64 { self.stored_at }

    pub(crate) fn into_parts(self) -> (StatusCode, Vec<(String, String)>, Vec<u8>) {
        (self.status, self.headers, self.body)
    }
}

/// Wire shape: the status travels as a bare number and is checked on the
/// way back in.
#[derive(Serialize, Deserialize)]
struct ResultFields {
    status: u16,
    #[serde(default)]
    headers: Vec<(String, String)>,
    #[serde(default)]
    body: Vec<u8>,
    stored_at: u64,
}

impl TryFrom<ResultFields> for CachedResult {
    type Error = ValidationError;

    fn try_from(fields: ResultFields) -> Result<Self, Self::Error> {
        let status = StatusCode::from_u16(fields.status).map_err(|_| ValidationError::Range {
            field: "status",
            value: i64::from(fields.status),
            min: 100,
            max: 999,
        })?;
        Ok(Self::new(status, fields.headers, fields.body, fields.stored_at))
    }
}

impl From<CachedResult> for ResultFields {
    fn from(r: CachedResult) -> Self {
        Self { status: r.status.as_u16(), headers: r.headers, body: r.body, stored_at: r.stored_at }
    }
}
