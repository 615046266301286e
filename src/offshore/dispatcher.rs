//! Offshore link server.
//!
//! # Responsibilities
//! - Accept ship links, each served by its own task
//! - Read request frames and answer each with exactly one response frame
//! - Route CONNECT to a tunnel and everything else to the forwarder
//!
//! # Link lifecycle
//! ```text
//! framed loop ──CONNECT ok──► raw relay ──► closed
//!     │  ▲
//!     └──┘ request / response (incl. 400 and 502 replies)
//! ```

use bytes::Bytes;
use reqwest::StatusCode;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use crate::config::OffshoreConfig;
use crate::http::response::synthesize;
use crate::http::{RawRequest, CONNECTION_ESTABLISHED};
use crate::net::{relay, ConnectionId, ConnectionTracker, Listener, ListenerError};
use crate::observability::metrics;
use crate::offshore::connect::{open_target, parse_target};
use crate::offshore::forwarder::HttpForwarder;
use crate::protocol::{read_frame, write_frame, Frame, FrameError, MessageType};

/// How a link's framed loop ended.
enum LinkEnd {
    Closed,
    Tunneled,
}

/// Serves ship links on the offshore host.
pub struct OffshoreDispatcher {
    forwarder: HttpForwarder,
    config: OffshoreConfig,
    tracker: ConnectionTracker,
}

impl OffshoreDispatcher {
    pub fn new(forwarder: HttpForwarder, config: OffshoreConfig) -> Self {
        Self {
            forwarder,
            config,
            tracker: ConnectionTracker::new("link"),
        }
    }

    /// Tracker for live ship links.
    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Accept links until `shutdown` fires. Links already being served keep
    /// running.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "Offshore proxy accepting links");
        }
        let dispatcher = Arc::new(self);

        loop {
            let accepted = tokio::select! {
                res = listener.accept() => res,
                _ = shutdown.recv() => break,
            };

            match accepted {
                Ok((stream, peer, permit)) => {
                    let dispatcher = Arc::clone(&dispatcher);
                    tokio::spawn(async move {
                        let _permit = permit;
                        dispatcher.handle_link(stream, peer).await;
                    });
                }
                Err(ListenerError::Accept(e)) => {
                    tracing::warn!(error = %e, "Failed to accept link");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!("Offshore proxy stopped accepting");
        Ok(())
    }

    async fn handle_link(&self, mut stream: TcpStream, peer: SocketAddr) {
        let guard = self.tracker.track();
        let conn_id = guard.id();
        let _ = stream.set_nodelay(true);
        tracing::info!(connection_id = %conn_id, peer = %peer, "Ship link connected");

        match self.serve_link(&mut stream, conn_id).await {
            Ok(LinkEnd::Closed) => {
                tracing::info!(connection_id = %conn_id, "Ship link closed");
            }
            Ok(LinkEnd::Tunneled) => {
                tracing::info!(connection_id = %conn_id, "Ship link ended after tunnel");
            }
            Err(FrameError::ConnectionClosed(_)) => {
                tracing::info!(connection_id = %conn_id, "Ship link closed by peer");
            }
            Err(e) => {
                tracing::warn!(connection_id = %conn_id, error = %e, "Ship link failed");
            }
        }
    }

    async fn serve_link(&self, stream: &mut TcpStream, conn_id: ConnectionId) -> Result<LinkEnd, FrameError> {
        let max_frame = self.config.server.max_frame_bytes;

        loop {
            let frame = match read_frame(stream, max_frame).await {
                Ok(frame) => frame,
                Err(FrameError::ConnectionClosed("header")) => return Ok(LinkEnd::Closed),
                Err(e) => return Err(e),
            };

            if frame.kind != MessageType::Request {
                tracing::warn!(connection_id = %conn_id, kind = ?frame.kind, "Skipping unexpected frame");
                continue;
            }

            let request = match RawRequest::parse(&frame.payload) {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!(connection_id = %conn_id, error = %e, "Unparseable request");
                    reply(stream, synthesize(StatusCode::BAD_REQUEST)).await?;
                    continue;
                }
            };

            if request.head.is_connect() {
                if self.open_tunnel(stream, &request, conn_id).await? {
                    return Ok(LinkEnd::Tunneled);
                }
                continue;
            }

            let mut response = self.forwarder.forward(request).await;
            if response.len() > max_frame {
                tracing::warn!(
                    connection_id = %conn_id,
                    len = response.len(),
                    max = max_frame,
                    "Origin response exceeds frame limit"
                );
                response = synthesize(StatusCode::BAD_GATEWAY);
            }
            reply(stream, response).await?;
        }
    }

    /// Handle one CONNECT. Returns true if a tunnel ran, after which the
    /// link is spent.
    async fn open_tunnel(
        &self,
        stream: &mut TcpStream,
        request: &RawRequest,
        conn_id: ConnectionId,
    ) -> Result<bool, FrameError> {
        let (host, port) = match parse_target(&request.head.target) {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!(connection_id = %conn_id, error = %e, "Bad CONNECT target");
                reply(stream, synthesize(StatusCode::BAD_REQUEST)).await?;
                return Ok(false);
            }
        };

        let mut target = match open_target(&host, port, self.config.forward.connect_timeout()).await {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!(connection_id = %conn_id, error = %e, "CONNECT target unreachable");
                reply(stream, synthesize(StatusCode::BAD_GATEWAY)).await?;
                return Ok(false);
            }
        };

        reply(stream, Bytes::from_static(CONNECTION_ESTABLISHED)).await?;
        metrics::record_tunnel("offshore");
        tracing::info!(connection_id = %conn_id, host = %host, port, "Tunnel established");

        let stats = relay(&mut *stream, &mut target, self.config.tunnel.linger()).await;
        tracing::info!(
            connection_id = %conn_id,
            host = %host,
            port,
            to_target = stats.a_to_b,
            from_target = stats.b_to_a,
            "Tunnel closed"
        );
        Ok(true)
    }
}

async fn reply(stream: &mut TcpStream, payload: Bytes) -> Result<(), FrameError> {
    write_frame(stream, &Frame::response(payload)).await
}
