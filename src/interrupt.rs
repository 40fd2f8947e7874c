//! Short-circuit outcomes.
//!
//! Controllers and middleware return an [`Outcome`]. `Continue` means
//! "carry on"; every other variant is terminal and goes straight to
//! response emission, skipping whatever was left of the pipeline and the
//! controller. Each call site propagates the value explicitly:
//!
//! ```rust,ignore
//! fn show(&self, ctx: &mut Context) -> Result<Outcome, Error> {
//!     if let Some(hit) = ctx.cached(&self.cache, &pointer) {
//!         return Ok(hit);
//!     }
//!     // ... normal work ...
//!     Ok(Outcome::Continue)
//! }
//! ```
//!
//! Terminal outcomes are not errors and are never logged as failures.
//! Because a function returns exactly one value, a request can carry at
//! most one of them.

use std::fmt;
use std::path::{Path, PathBuf};

use http::StatusCode;

use crate::cache::CachedResult;
use crate::error::ValidationError;
use crate::response::{IntoResponse, Response};

/// What a controller or middleware stage asks the dispatcher to do next.
#[derive(Debug)]
pub enum Outcome {
    /// Keep going: next stage, or normal response assembly after the controller.
    Continue,
    /// Emit a stored result verbatim.
    Cached(CachedResult),
    /// Stream a file as an attachment.
    Download(FileDownload),
    /// Emit a response built by the interrupting code.
    Finalized(Box<dyn Finalize>),
}

impl Outcome {
    /// Finalize with any [`IntoResponse`] value.
    pub fn finalize(response: impl IntoResponse) -> Self {
        Self::Finalized(Box::new(response.into_response()))
    }

    /// Finalize with an empty body.
    pub fn status(code: StatusCode) -> Self {
        Self::finalize(code)
    }

    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }

    pub fn kind(&self) -> Option<EmissionKind> {
        match self {
            Self::Continue     => None,
            Self::Cached(_)    => Some(EmissionKind::Cached),
            Self::Download(_)  => Some(EmissionKind::Download),
            Self::Finalized(_) => Some(EmissionKind::Finalized),
        }
    }
}

impl From<CachedResult> for Outcome {
    fn from(result: CachedResult) -> Self { Self::Cached(result) }
}

impl From<FileDownload> for Outcome {
    fn from(download: FileDownload) -> Self { Self::Download(download) }
}

/// A terminal response shape with a status code.
///
/// Implementors produce the object the transport layer serializes; the
/// dispatcher adds its uniform headers on top.
pub trait Finalize: fmt::Debug + Send {
    fn status(&self) -> StatusCode;
    fn response_object(self: Box<Self>) -> Response;
}

impl Finalize for Response {
    fn status(&self) -> StatusCode { self.status }
    fn response_object(self: Box<Self>) -> Response { *self }
}

// ── Emission state ────────────────────────────────────────────────────────────

/// Which path produced the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmissionKind {
    Normal,
    Cached,
    Download,
    Finalized,
    Failure,
}

/// Per-request emission state. Moves forward only:
/// `Running → Emitting(kind) → Sent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Running,
    Emitting(EmissionKind),
    Sent,
}

// ── File download ─────────────────────────────────────────────────────────────

/// A file sent as an attachment.
///
/// The path is canonicalized at construction; a path that does not resolve
/// to a regular file fails right there, before any outcome exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDownload {
    path: PathBuf,
    filename: String,
    content_type: String,
    status: StatusCode,
    len: u64,
    size: Option<u64>,
}

impl FileDownload {
    pub fn new(
        path: impl AsRef<Path>,
        filename: impl Into<String>,
        content_type: impl AsRef<str>,
    ) -> Result<Self, ValidationError> {
        let requested = path.as_ref();
        let unresolved = |reason: String| ValidationError::UnresolvedPath { path: requested.to_path_buf(), reason };

        let path = requested.canonicalize().map_err(|e| unresolved(e.to_string()))?;
        let meta = path.metadata().map_err(|e| unresolved(e.to_string()))?;
        if !meta.is_file() {
            return Err(unresolved("not a regular file".to_owned()));
        }

        let filename = filename.into();
        if filename.trim().is_empty() {
            return Err(ValidationError::Length { field: "filename", len: 0, min: 1, max: usize::MAX });
        }
        if filename.chars().any(|c| c.is_control() || matches!(c, '"' | ';' | '\\' | '/')) {
            return Err(ValidationError::Charset {
                field: "filename",
                value: filename,
                allowed: "printable characters except \" ; \\ /",
            });
        }

        Ok(Self {
            path,
            filename,
            content_type: content_type.as_ref().to_owned(),
            status: StatusCode::OK,
            len: meta.len(),
            size: None,
        })
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Announce the size up front; sent as `content-length`. It has to
    /// match the file as it was when the download was built.
    pub fn with_size(mut self, size: u64) -> Result<Self, ValidationError> {
        if size != self.len {
            let len = i64::try_from(self.len).unwrap_or(i64::MAX);
            let value = i64::try_from(size).unwrap_or(i64::MAX);
            return Err(ValidationError::Range { field: "size", value, min: len, max: len });
        }
        self.size = Some(size);
        Ok(self)
    }

    pub fn path(&self) -> &Path { &self.path }
    pub fn filename(&self) -> &str { &self.filename }
    pub fn content_type(&self) -> &str { &self.content_type }
    pub fn size(&self) -> Option<u64> { self.size }

    /// Download headers, in emission order.
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("content-type".to_owned(), self.content_type.clone()),
            ("content-disposition".to_owned(), format!("attachment; filename={}", self.filename)),
            ("content-transfer-encoding".to_owned(), "binary".to_owned()),
            ("pragma".to_owned(), "public".to_owned()),
            ("expires".to_owned(), "0".to_owned()),
        ];
        if let Some(size) = self.size {
            headers.push(("content-length".to_owned(), size.to_string()));
        }
        headers
    }
}

impl Finalize for FileDownload {
    fn status(&self) -> StatusCode { self.status }

    fn response_object(self: Box<Self>) -> Response {
        let headers = self.headers();
        Response::file(self.status, headers, self.path)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn download_headers_have_fixed_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"a,b\n1,2\n3,4\n").unwrap();
        let dl = FileDownload::new(file.path(), "report.csv", "text/csv").unwrap().with_size(12).unwrap();
        let names: Vec<String> = dl.headers().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, [
            "content-type",
            "content-disposition",
            "content-transfer-encoding",
            "pragma",
            "expires",
            "content-length",
        ]);
        assert_eq!(dl.headers()[1].1, "attachment; filename=report.csv");
        assert_eq!(dl.status(), StatusCode::OK);
    }

    #[test]
    fn announced_size_must_match_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();
        let dl = FileDownload::new(file.path(), "digits.txt", "text/plain").unwrap();

        let err = dl.clone().with_size(4096).unwrap_err();
        assert!(matches!(err, ValidationError::Range { field: "size", value: 4096, min: 10, max: 10 }));
        assert_eq!(dl.with_size(10).unwrap().size(), Some(10));
    }

    #[test]
    fn missing_file_fails_at_construction() {
        let err = FileDownload::new("/definitely/not/here.bin", "here.bin", "application/octet-stream").unwrap_err();
        assert!(matches!(err, ValidationError::UnresolvedPath { .. }));
    }

    #[test]
    fn directories_are_not_downloads() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileDownload::new(dir.path(), "dir", "application/zip").is_err());
    }

    #[test]
    fn filenames_cannot_break_the_disposition_header() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(FileDownload::new(file.path(), "a\";b", "text/plain").is_err());
        assert!(FileDownload::new(file.path(), "  ", "text/plain").is_err());
    }

    #[test]
    fn finalized_outcome_keeps_its_status() {
        let outcome = Outcome::status(StatusCode::ACCEPTED);
        assert_eq!(outcome.kind(), Some(EmissionKind::Finalized));
        let Outcome::Finalized(f) = outcome else { panic!("expected finalized") };
        assert_eq!(f.status(), StatusCode::ACCEPTED);
        assert_eq!(f.response_object().status_code(), StatusCode::ACCEPTED);
    }

    #[test]
    fn download_response_object_streams_the_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let dl = FileDownload::new(file.path(), "x.bin", "application/octet-stream")
            .unwrap()
            .with_status(StatusCode::PARTIAL_CONTENT);
        let res = Box::new(dl).response_object();
        assert_eq!(res.status_code(), StatusCode::PARTIAL_CONTENT);
        assert!(res.body_bytes().is_none());
    }
}
