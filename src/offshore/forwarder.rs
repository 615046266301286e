//! Outbound HTTP client for non-CONNECT requests.
//!
//! # Responsibilities
//! - Resolve the origin from an absolute URL or the Host header
//! - Drop hop-by-hop headers in both directions
//! - Buffer the full response and serialize it as raw HTTP/1.1
//! - Turn every failure into a 502

use bytes::Bytes;
use reqwest::{Client, Method, StatusCode};
use std::time::Instant;
use thiserror::Error;
use url::Url;

use crate::config::ForwardConfig;
use crate::http::response::synthesize;
use crate::http::{Headers, RawRequest, RawResponse, RequestHead};
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("request names no target host")]
    NoTarget,

    #[error("invalid target URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported URL scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("invalid method {0:?}")]
    InvalidMethod(String),

    #[error("origin request failed: {0}")]
    Client(#[from] reqwest::Error),
}

/// Issues requests to origin servers on behalf of the ship.
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    client: Client,
}

impl HttpForwarder {
    pub fn new(config: &ForwardConfig) -> Result<Self, ForwardError> {
        let client = Client::builder()
            .no_proxy()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { client })
    }

    /// Forward `request` and return the raw response bytes. Never fails:
    /// any error becomes `502 Bad Gateway`.
    pub async fn forward(&self, request: RawRequest) -> Bytes {
        let started = Instant::now();
        let method = request.head.method.clone();
        let target = request.head.target.clone();

        match self.try_forward(request).await {
            Ok(response) => {
                metrics::record_forward(response.status.as_u16());
                tracing::info!(
                    method = %method,
                    target = %target,
                    status = response.status.as_u16(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Forwarded request"
                );
                response.to_bytes()
            }
            Err(e) => {
                metrics::record_forward(StatusCode::BAD_GATEWAY.as_u16());
                tracing::warn!(method = %method, target = %target, error = %e, "Forwarding failed");
                synthesize(StatusCode::BAD_GATEWAY)
            }
        }
    }

    async fn try_forward(&self, request: RawRequest) -> Result<RawResponse, ForwardError> {
        let RawRequest { head, body } = request;
        let url = resolve_target(&head)?;
        let method = Method::from_bytes(head.method.as_bytes())
            .map_err(|_| ForwardError::InvalidMethod(head.method.clone()))?;
        let has_body = !body.is_empty() || head.headers.contains("content-length");

        let mut headers = head.headers;
        headers.strip_hop_by_hop();
        // Recomputed by the client from the body.
        headers.remove("content-length");

        tracing::debug!(method = %method, url = %url, "Sending origin request");

        let mut builder = self.client.request(method.clone(), url);
        for (name, value) in headers.iter() {
            builder = builder.header(name, value);
        }
        if has_body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();

        let mut response_headers = Headers::new();
        for (name, value) in response.headers() {
            response_headers.append(name.as_str(), value.as_bytes());
        }
        let body = response.bytes().await?;

        response_headers.strip_hop_by_hop();
        if method != Method::HEAD && !is_bodiless(status) {
            response_headers.set("Content-Length", body.len().to_string());
        }

        Ok(RawResponse {
            status,
            headers: response_headers,
            body,
        })
    }
}

fn is_bodiless(status: StatusCode) -> bool {
    status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED
}

/// Work out where a proxied request goes.
///
/// An absolute `http://` or `https://` target is used as is. Anything else
/// is treated as a path on the host named by the Host header, over plain HTTP.
pub fn resolve_target(head: &RequestHead) -> Result<Url, ForwardError> {
    let target = head.target.as_str();
    let lower = target.to_ascii_lowercase();

    if lower.starts_with("http://") || lower.starts_with("https://") {
        let url = Url::parse(target)?;
        if url.host_str().is_none() {
            return Err(ForwardError::NoTarget);
        }
        return Ok(url);
    }
    if let Some((scheme, _)) = lower.split_once("://") {
        return Err(ForwardError::UnsupportedScheme(scheme.to_string()));
    }

    let host = head
        .headers
        .get("host")
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or(ForwardError::NoTarget)?;
    let path = if target.starts_with('/') {
        target.to_string()
    } else {
        format!("/{target}")
    };
    Ok(Url::parse(&format!("http://{host}{path}"))?)
}
