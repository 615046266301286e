//! Local proxy port facing ship clients.
//!
//! # Responsibilities
//! - Accept client connections (bounded by the listener)
//! - Read one HTTP/1.1 request at a time, head then Content-Length body
//! - Queue it on the uplink and wait up to the request timeout
//! - Write the response bytes back verbatim, or 502/504 on failure
//! - For an accepted CONNECT, relay bytes between client and link
//!
//! Connections are kept alive across requests until the client closes,
//! asks to close, or a CONNECT finishes.

use bytes::{Buf, Bytes, BytesMut};
use reqwest::StatusCode;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use crate::config::{LocalConfig, TunnelConfig};
use crate::http::response::{synthesize, synthesize_close};
use crate::http::{parse_head, HttpParseError, RawRequest, RequestHead};
use crate::net::{relay, ConnectionTracker, Listener, ListenerError};
use crate::observability::metrics;
use crate::ship::job::{Completion, Job, JobResponse};
use crate::ship::uplink::UplinkSession;

/// Why reading a request from a client stopped.
#[derive(Debug, Error)]
enum ReadError {
    #[error("request head exceeds {0} bytes")]
    HeadTooLarge(usize),

    #[error("request body of {len} bytes exceeds {max} bytes")]
    BodyTooLarge { len: usize, max: usize },

    #[error("chunked request bodies are not supported")]
    Chunked,

    #[error(transparent)]
    Parse(#[from] HttpParseError),

    #[error("client closed mid-request")]
    Truncated,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReadError {
    /// Reply owed to the client before closing, if any.
    fn reply(&self) -> Option<Bytes> {
        let status = match self {
            ReadError::HeadTooLarge(_) => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            ReadError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ReadError::Chunked => StatusCode::LENGTH_REQUIRED,
            ReadError::Parse(_) => StatusCode::BAD_REQUEST,
            ReadError::Truncated | ReadError::Io(_) => return None,
        };
        Some(synthesize_close(status))
    }
}

/// The ship's local HTTP proxy.
pub struct LocalFrontend {
    uplink: UplinkSession,
    config: LocalConfig,
    tunnel: TunnelConfig,
    tracker: ConnectionTracker,
}

impl LocalFrontend {
    pub fn new(uplink: UplinkSession, config: LocalConfig, tunnel: TunnelConfig) -> Self {
        Self {
            uplink,
            config,
            tunnel,
            tracker: ConnectionTracker::new("local"),
        }
    }

    /// Tracker for live client connections, used for draining on shutdown.
    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Accept clients until `shutdown` fires.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "Local proxy accepting clients");
        }
        let frontend = Arc::new(self);

        loop {
            let accepted = tokio::select! {
                res = listener.accept() => res,
                _ = shutdown.recv() => break,
            };

            match accepted {
                Ok((stream, peer, permit)) => {
                    let frontend = Arc::clone(&frontend);
                    tokio::spawn(async move {
                        let _permit = permit;
                        frontend.handle_client(stream, peer).await;
                    });
                }
                Err(ListenerError::Accept(e)) => {
                    tracing::warn!(error = %e, "Failed to accept client");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!("Local proxy stopped accepting");
        Ok(())
    }

    async fn handle_client(&self, mut stream: TcpStream, peer: SocketAddr) {
        let guard = self.tracker.track();
        let conn_id = guard.id();
        tracing::debug!(connection_id = %conn_id, peer = %peer, "Client connected");

        let mut buf = BytesMut::with_capacity(8 * 1024);

        loop {
            let request = match self.read_request(&mut stream, &mut buf).await {
                Ok(Some(request)) => request,
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(connection_id = %conn_id, error = %e, "Dropping client request");
                    if let Some(reply) = e.reply() {
                        let _ = stream.write_all(&reply).await;
                    }
                    break;
                }
            };

            let is_connect = request.head.is_connect();
            let wants_close = wants_close(&request.head);
            let (job, handle) = Job::new(request);
            let job_id = job.id();
            tracing::info!(
                connection_id = %conn_id,
                job_id = %job_id,
                method = %job.request().head.method,
                target = %job.request().head.target,
                "Queuing request"
            );
            self.uplink.submit(job);

            let started = handle.submitted();
            let reply = match handle.wait(self.config.request_timeout()).await {
                Completion::Response(JobResponse::Complete(bytes)) => {
                    metrics::record_job("ok", started);
                    bytes
                }
                Completion::Response(JobResponse::Tunnel { response, mut link }) => {
                    metrics::record_job("tunnel", started);
                    if let Err(e) = stream.write_all(&response).await {
                        tracing::debug!(job_id = %job_id, error = %e, "Client gone before tunnel start");
                        break;
                    }
                    // Bytes the client pipelined after the CONNECT head belong to the tunnel.
                    if !buf.is_empty() {
                        if let Err(e) = link.stream_mut().write_all(&buf).await {
                            tracing::debug!(job_id = %job_id, error = %e, "Link gone before tunnel start");
                            break;
                        }
                        buf.clear();
                    }
                    let stats = relay(&mut stream, link.stream_mut(), self.tunnel.linger()).await;
                    tracing::info!(
                        job_id = %job_id,
                        sent = stats.a_to_b,
                        received = stats.b_to_a,
                        "Tunnel closed"
                    );
                    break;
                }
                Completion::Failed(e) => {
                    metrics::record_job("failed", started);
                    tracing::warn!(job_id = %job_id, error = %e, "Request failed");
                    synthesize(StatusCode::BAD_GATEWAY)
                }
                Completion::TimedOut => {
                    metrics::record_job("timeout", started);
                    tracing::warn!(job_id = %job_id, "Timed out waiting for response");
                    synthesize(StatusCode::GATEWAY_TIMEOUT)
                }
            };

            if let Err(e) = stream.write_all(&reply).await {
                tracing::debug!(connection_id = %conn_id, error = %e, "Failed to write response");
                break;
            }
            if is_connect || wants_close {
                break;
            }
        }

        let _ = stream.shutdown().await;
        tracing::debug!(connection_id = %conn_id, "Client disconnected");
    }

    /// Read the next request. `Ok(None)` means the client closed cleanly
    /// between requests.
    async fn read_request(
        &self,
        stream: &mut TcpStream,
        buf: &mut BytesMut,
    ) -> Result<Option<RawRequest>, ReadError> {
        let (head, consumed) = loop {
            if let Some(parsed) = parse_head(&buf[..])? {
                break parsed;
            }
            if buf.len() >= self.config.max_header_bytes {
                return Err(ReadError::HeadTooLarge(self.config.max_header_bytes));
            }
            if stream.read_buf(buf).await? == 0 {
                return if buf.is_empty() {
                    Ok(None)
                } else {
                    Err(ReadError::Truncated)
                };
            }
        };
        if consumed > self.config.max_header_bytes {
            return Err(ReadError::HeadTooLarge(self.config.max_header_bytes));
        }
        buf.advance(consumed);

        if head.headers.is_chunked() {
            return Err(ReadError::Chunked);
        }
        let len = head.body_length()?;
        if len > self.config.max_body_bytes {
            return Err(ReadError::BodyTooLarge {
                len,
                max: self.config.max_body_bytes,
            });
        }

        while buf.len() < len {
            if stream.read_buf(buf).await? == 0 {
                return Err(ReadError::Truncated);
            }
        }
        let body = buf.split_to(len).freeze();

        Ok(Some(RawRequest::new(head, body)))
    }
}

fn wants_close(head: &RequestHead) -> bool {
    ["connection", "proxy-connection"].iter().any(|name| {
        head.headers
            .get(name)
            .is_some_and(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("close")))
    })
}
