//! Raw HTTP/1.1 response construction.
//!
//! # Responsibilities
//! - Serialize origin responses into one contiguous payload
//! - Synthesize bodiless status responses for failures
//! - Read the status code back out of a raw response

use bytes::Bytes;
use reqwest::StatusCode;

use crate::http::headers::Headers;

/// Reply sent once a CONNECT target has been reached.
pub const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

/// A response with its body fully buffered.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: Headers,
    pub body: Bytes,
}

impl RawResponse {
    /// Status line, headers, blank line, body.
    pub fn to_bytes(&self) -> Bytes {
        let mut out = Vec::with_capacity(256 + self.body.len());
        out.extend_from_slice(status_line(self.status).as_bytes());
        self.headers.write_to(&mut out);
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        Bytes::from(out)
    }
}

/// `HTTP/1.1 <code> <reason>\r\n`
pub fn status_line(status: StatusCode) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    )
}

/// A bodiless response for `status`.
pub fn synthesize(status: StatusCode) -> Bytes {
    Bytes::from(format!("{}Content-Length: 0\r\n\r\n", status_line(status)))
}

/// Like [`synthesize`], but tells the client the connection is ending.
pub fn synthesize_close(status: StatusCode) -> Bytes {
    Bytes::from(format!(
        "{}Content-Length: 0\r\nConnection: close\r\n\r\n",
        status_line(status)
    ))
}

/// Status code from the first line of a raw response.
pub fn parse_status(raw: &[u8]) -> Option<u16> {
    let line_end = raw.iter().position(|&b| b == b'\n').unwrap_or(raw.len());
    let line = std::str::from_utf8(&raw[..line_end]).ok()?;
    let mut parts = line.split_whitespace();

    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

/// True when `raw` is a 2xx reply, i.e. a CONNECT tunnel is open.
pub fn is_tunnel_established(raw: &[u8]) -> bool {
    matches!(parse_status(raw), Some(code) if (200..300).contains(&code))
}
