//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! A [`Response`] is the transport-neutral shape every emission path ends
//! in: the controller's normal result, a cached result, a file download or
//! an explicitly finalized response. The dispatcher turns it into a hyper
//! response in one place, so header assignment is the same for all of them.

use std::io;
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use futures_util::stream;
use http::StatusCode;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use tokio::io::AsyncReadExt;

use crate::cache::CachedResult;

/// Body type handed to hyper.
pub type ResponseBody = UnsyncBoxBody<Bytes, io::Error>;

const FILE_CHUNK: usize = 64 * 1024;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Csv,          // text/csv
    EventStream,  // text/event-stream  (SSE)
    FormData,     // application/x-www-form-urlencoded
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    MsgPack,      // application/msgpack
    OctetStream,  // application/octet-stream  (binary / file download)
    Pdf,          // application/pdf
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
    Zip,          // application/zip
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv         => "text/csv",
            Self::EventStream => "text/event-stream",
            Self::FormData    => "application/x-www-form-urlencoded",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::MsgPack     => "application/msgpack",
            Self::OctetStream => "application/octet-stream",
            Self::Pdf         => "application/pdf",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
            Self::Zip         => "application/zip",
        }
    }
}

impl AsRef<str> for ContentType {
    fn as_ref(&self) -> &str { self.as_str() }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use keel::{ContentType, Response};
/// use http::StatusCode;
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .bytes(ContentType::Xml, b"<ok/>".to_vec());
/// ```
#[derive(Debug)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Body,
}

#[derive(Debug)]
pub(crate) enum Body {
    Bytes(Bytes),
    File(PathBuf),
}

impl Response {
    /// `200 OK`, `application/json`.
    pub fn json(body: Vec<u8>) -> Self {
        Self::builder().json(body)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { status: code, headers: Vec::new(), body: Body::Bytes(Bytes::new()) }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: StatusCode::OK }
    }

    pub(crate) fn file(status: StatusCode, headers: Vec<(String, String)>, path: PathBuf) -> Self {
        Self { status, headers, body: Body::File(path) }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }

    /// In-memory body bytes; `None` for a streamed file.
    pub fn body_bytes(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Bytes(b) => Some(b.as_ref()),
            Body::File(_) => None,
        }
    }

    /// Opens file bodies and converts everything into a hyper body.
    pub(crate) async fn into_body(body: Body) -> io::Result<ResponseBody> {
        match body {
            Body::Bytes(bytes) => Ok(Full::new(bytes).map_err(|never| match never {}).boxed_unsync()),
            Body::File(path) => open_stream(&path).await,
        }
    }
}

pub(crate) fn empty_body() -> ResponseBody {
    Full::new(Bytes::new()).map_err(|never| match never {}).boxed_unsync()
}

impl From<CachedResult> for Response {
    fn from(result: CachedResult) -> Self {
        let (status, headers, body) = result.into_parts();
        Self {
            status,
            headers,
            body: Body::Bytes(Bytes::from(body)),
        }
    }
}

/// Streams a file in fixed-size chunks rather than reading it whole.
async fn open_stream(path: &Path) -> io::Result<ResponseBody> {
    let file = tokio::fs::File::open(path).await?;
    let chunks = stream::try_unfold(file, |mut file| async move {
        let mut buf = BytesMut::with_capacity(FILE_CHUNK);
        let read = file.read_buf(&mut buf).await?;
        let next = (read > 0).then(|| (Frame::data(buf.freeze()), file));
        Ok::<_, io::Error>(next)
    });
    Ok(StreamBody::new(chunks).boxed_unsync())
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method.
pub struct ResponseBuilder {
    headers: Vec<(String, String)>,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn json(self, body: Vec<u8>) -> Response {
        self.finish(ContentType::Json.as_str(), body)
    }

    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(ContentType::Text.as_str(), body.into().into_bytes())
    }

    /// Terminate with a typed body. Use this for XML, HTML, binary, SSE, etc.
    pub fn bytes(self, content_type: ContentType, body: Vec<u8>) -> Response {
        self.finish(content_type.as_str(), body)
    }

    /// Terminate with no body (e.g. `204 No Content`, `301 Moved Permanently`).
    pub fn no_body(self) -> Response {
        Response { status: self.status, headers: self.headers, body: Body::Bytes(Bytes::new()) }
    }

    fn finish(self, content_type: &str, body: Vec<u8>) -> Response {
        let mut headers = vec![("content-type".to_owned(), content_type.to_owned())];
        headers.extend(self.headers);
        Response { status: self.status, headers, body: Body::Bytes(Bytes::from(body)) }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Anything implementing it can be handed to
/// [`Outcome::finalize`](crate::Outcome::finalize).
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn builder_puts_content_type_first() {
        let res = Response::builder()
            .status(StatusCode::CREATED)
            .header("location", "/users/42")
            .json(b"{}".to_vec());
        assert_eq!(res.status_code(), StatusCode::CREATED);
        assert_eq!(res.headers()[0], ("content-type".to_owned(), "application/json".to_owned()));
        assert_eq!(res.headers()[1].0, "location");
    }

    #[test]
    fn cached_result_converts_unmodified() {
        let headers = vec![("x-a".to_owned(), "1".to_owned()), ("x-b".to_owned(), "2".to_owned())];
        let status = StatusCode::NON_AUTHORITATIVE_INFORMATION;
        let res = Response::from(CachedResult::new(status, headers.clone(), b"body".to_vec(), 7));
        assert_eq!(res.status_code(), StatusCode::NON_AUTHORITATIVE_INFORMATION);
        assert_eq!(res.headers(), headers.as_slice());
        assert_eq!(res.body_bytes(), Some(&b"body"[..]));
    }

    #[tokio::test]
    async fn file_bodies_stream_every_byte() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let content = vec![b'k'; FILE_CHUNK * 2 + 17];
        file.write_all(&content).unwrap();

        let body = Response::into_body(Body::File(file.path().to_path_buf())).await.unwrap();
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(collected.len(), content.len());
    }
}
