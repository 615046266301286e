//! Raw HTTP/1.1 request parsing and serialization.
//!
//! # Responsibilities
//! - Parse request heads incrementally off a socket buffer (ship side)
//! - Parse a complete request out of a frame payload (offshore side)
//! - Serialize a request back into wire bytes for framing
//!
//! Head parsing is delegated to `httparse`; this module only owns the
//! body-delimiting rules and the conversion into owned types.

use bytes::Bytes;
use thiserror::Error;

use crate::http::headers::Headers;

/// Upper bound on header fields in one request head.
pub const MAX_HEADERS: usize = 100;

#[derive(Debug, Error)]
pub enum HttpParseError {
    #[error("malformed request head: {0}")]
    Malformed(#[from] httparse::Error),

    #[error("request head is incomplete")]
    Incomplete,

    #[error("invalid Content-Length header")]
    InvalidContentLength,

    #[error("body shorter than Content-Length (expected {expected}, got {actual})")]
    TruncatedBody { expected: usize, actual: usize },
}

/// Request line plus header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    /// Absolute URL, origin-form path, or `host:port` for CONNECT.
    pub target: String,
    pub headers: Headers,
}

impl RequestHead {
    pub fn is_connect(&self) -> bool {
        self.method.eq_ignore_ascii_case("CONNECT")
    }

    /// Declared body length. Missing means zero; unparseable is an error.
    pub fn body_length(&self) -> Result<usize, HttpParseError> {
        match self.headers.get("content-length") {
            None => Ok(0),
            Some(_) => self
                .headers
                .content_length()
                .ok_or(HttpParseError::InvalidContentLength),
        }
    }
}

/// Try to parse a request head from the start of `buf`.
///
/// Returns `Ok(None)` while the head is still incomplete, otherwise the head
/// and the number of bytes it occupied.
pub fn parse_head(buf: &[u8]) -> Result<Option<(RequestHead, usize)>, HttpParseError> {
    let mut fields = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut fields);

    let consumed = match req.parse(buf)? {
        httparse::Status::Complete(n) => n,
        httparse::Status::Partial => return Ok(None),
    };

    let headers = req
        .headers
        .iter()
        .map(|h| (h.name.to_string(), h.value.to_vec()))
        .collect();

    let head = RequestHead {
        method: req.method.unwrap_or_default().to_string(),
        target: req.path.unwrap_or_default().to_string(),
        headers,
    };
    Ok(Some((head, consumed)))
}

/// A complete request: head plus fully buffered body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest {
    pub head: RequestHead,
    pub body: Bytes,
}

impl RawRequest {
    pub fn new(head: RequestHead, body: impl Into<Bytes>) -> Self {
        Self {
            head,
            body: body.into(),
        }
    }

    /// Parse a request that is entirely contained in `payload`.
    ///
    /// The body is delimited by `Content-Length`; without one, every byte
    /// after the blank line is taken as the body.
    pub fn parse(payload: &[u8]) -> Result<Self, HttpParseError> {
        let (head, consumed) = parse_head(payload)?.ok_or(HttpParseError::Incomplete)?;
        let rest = &payload[consumed..];

        let body = if head.headers.contains("content-length") {
            let expected = head.body_length()?;
            if rest.len() < expected {
                return Err(HttpParseError::TruncatedBody {
                    expected,
                    actual: rest.len(),
                });
            }
            &rest[..expected]
        } else {
            rest
        };

        Ok(Self {
            head,
            body: Bytes::copy_from_slice(body),
        })
    }

    /// Serialize as `METHOD target HTTP/1.1`, headers, blank line, body.
    pub fn to_bytes(&self) -> Bytes {
        let mut out = Vec::with_capacity(256 + self.body.len());
        out.extend_from_slice(self.head.method.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.head.target.as_bytes());
        out.extend_from_slice(b" HTTP/1.1\r\n");
        self.head.headers.write_to(&mut out);
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        Bytes::from(out)
    }
}
