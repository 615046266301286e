//! The single link to the offshore host and the worker that drives it.
//!
//! # Responsibilities
//! - Hold the FIFO job queue shared by all local connections
//! - Run exactly one request/response exchange on the link at a time
//! - Reconnect with exponential backoff when the link is down
//! - Hand the raw link over to a CONNECT tunnel and retire it afterwards
//!
//! # Worker loop
//! ```text
//! ┌──────────────┐   link up   ┌────────────┐   job   ┌──────────────┐
//! │ connect with ├────────────►│ wait for   ├────────►│ frame, send, │
//! │ retry        │◄────────────┤ next job   │◄────────┤ read reply   │
//! └──────────────┘  link lost  └────────────┘         └──────────────┘
//! ```
//! A failed exchange fails only its own job; the link is dropped and the
//! next job waits for a fresh one.

use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::LinkConfig;
use crate::http::response::is_tunnel_established;
use crate::observability::metrics;
use crate::protocol::{read_frame, write_frame, Frame, FrameError, MessageType};
use crate::resilience::calculate_backoff;
use crate::ship::job::{Job, JobError, JobResponse, LinkLease};

/// Errors on the link itself.
#[derive(Debug, Error)]
pub enum UplinkError {
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("connecting to {0} timed out")]
    ConnectTimeout(String),

    #[error("offshore unreachable after {attempts} attempts")]
    ConnectExhausted { attempts: u32 },

    #[error("link error: {0}")]
    Frame(#[from] FrameError),

    #[error("no response within {0:?}")]
    ResponseTimeout(Duration),

    #[error("unexpected message type {0:?} on link")]
    UnexpectedType(MessageType),
}

/// Cloneable handle used by local connections to enqueue jobs.
#[derive(Debug, Clone)]
pub struct UplinkSession {
    queue: mpsc::UnboundedSender<Job>,
}

impl UplinkSession {
    /// Start the worker. It runs until `shutdown` fires or every session
    /// handle is dropped.
    pub fn spawn(config: LinkConfig, shutdown: broadcast::Receiver<()>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = UplinkWorker {
            config,
            queue: rx,
            link: None,
            shutdown,
        };
        (Self { queue: tx }, tokio::spawn(worker.run()))
    }

    /// Append a job to the queue. Never blocks.
    ///
    /// If the worker is gone the job is failed immediately.
    pub fn submit(&self, job: Job) {
        if let Err(mpsc::error::SendError(job)) = self.queue.send(job) {
            job.fail(JobError::Closed);
        }
    }
}

struct UplinkWorker {
    config: LinkConfig,
    queue: mpsc::UnboundedReceiver<Job>,
    link: Option<TcpStream>,
    shutdown: broadcast::Receiver<()>,
}

enum Next {
    Job(Job),
    LinkLost,
    Stop,
}

impl UplinkWorker {
    async fn run(mut self) {
        tracing::info!(offshore = %self.config.offshore_address, "Uplink worker started");

        loop {
            if self.link.is_none() {
                let connected = tokio::select! {
                    res = connect_with_retry(&self.config) => res,
                    _ = self.shutdown.recv() => break,
                };
                match connected {
                    Ok(stream) => self.link = Some(stream),
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            pause = ?self.config.reconnect_pause(),
                            "Offshore unreachable, pausing before next round"
                        );
                        tokio::select! {
                            _ = tokio::time::sleep(self.config.reconnect_pause()) => continue,
                            _ = self.shutdown.recv() => break,
                        }
                    }
                }
            }

            let next = tokio::select! {
                job = self.queue.recv() => match job {
                    Some(job) => Next::Job(job),
                    None => Next::Stop,
                },
                _ = idle_link_closed(self.link.as_ref()) => Next::LinkLost,
                _ = self.shutdown.recv() => Next::Stop,
            };

            match next {
                Next::Job(job) => {
                    if !self.dispatch(job).await {
                        break;
                    }
                }
                Next::LinkLost => {
                    tracing::warn!("Link closed by offshore while idle");
                    self.link = None;
                }
                Next::Stop => break,
            }
        }

        // Whatever is still queued is failed by dropping it.
        self.queue.close();
        tracing::info!("Uplink worker stopped");
    }

    /// Run one job to completion. Returns false if shutdown arrived while a
    /// tunnel held the link.
    async fn dispatch(&mut self, job: Job) -> bool {
        let Some(mut stream) = self.link.take() else {
            job.fail(JobError::Link("link not connected".to_string()));
            return true;
        };

        let job_id = job.id();
        let is_connect = job.request().head.is_connect();
        tracing::debug!(
            job_id = %job_id,
            method = %job.request().head.method,
            target = %job.request().head.target,
            "Sending request over link"
        );

        let payload = match self.round_trip(&mut stream, &job).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Link exchange failed, dropping link");
                job.fail(JobError::Link(e.to_string()));
                return true;
            }
        };

        if !(is_connect && is_tunnel_established(&payload)) {
            self.link = Some(stream);
            job.complete(Ok(JobResponse::Complete(payload)));
            return true;
        }

        // The link is raw bytes from here on. Lend it out and wait.
        let (lease, released) = LinkLease::new(stream);
        metrics::record_tunnel("ship");
        tracing::info!(job_id = %job_id, "Tunnel established, link handed to client");
        job.complete(Ok(JobResponse::Tunnel {
            response: payload,
            link: lease,
        }));

        tokio::select! {
            _ = released => {
                tracing::info!(job_id = %job_id, "Tunnel ended, link retired");
                true
            }
            _ = self.shutdown.recv() => false,
        }
    }

    async fn round_trip(&self, stream: &mut TcpStream, job: &Job) -> Result<bytes::Bytes, UplinkError> {
        write_frame(stream, &Frame::request(job.request().to_bytes())).await?;

        let timeout = self.config.response_timeout();
        let frame = tokio::time::timeout(timeout, read_frame(stream, self.config.max_frame_bytes))
            .await
            .map_err(|_| UplinkError::ResponseTimeout(timeout))??;

        match frame.kind {
            MessageType::Response => Ok(frame.payload),
            other => Err(UplinkError::UnexpectedType(other)),
        }
    }
}

/// Resolves when an idle link is closed by the peer or carries stray bytes.
/// Never resolves without a link.
async fn idle_link_closed(link: Option<&TcpStream>) {
    let Some(stream) = link else {
        return std::future::pending().await;
    };
    let mut probe = [0u8; 1];
    match stream.peek(&mut probe).await {
        Ok(0) => {}
        Ok(_) => tracing::warn!("Unsolicited bytes on idle link"),
        Err(e) => tracing::debug!(error = %e, "Idle link errored"),
    }
}

/// Open the link, retrying with exponential backoff.
pub async fn connect_with_retry(config: &LinkConfig) -> Result<TcpStream, UplinkError> {
    let attempts = config.connect_attempts;

    for attempt in 1..=attempts {
        tracing::info!(attempt, address = %config.offshore_address, "Connecting to offshore proxy");

        match connect_once(config).await {
            Ok(stream) => {
                metrics::record_link_connect("ok");
                tracing::info!(address = %config.offshore_address, "Link established");
                return Ok(stream);
            }
            Err(e) => {
                metrics::record_link_connect("error");
                tracing::warn!(attempt, attempts, error = %e, "Connection attempt failed");
                if attempt < attempts {
                    let delay = calculate_backoff(attempt, config.base_delay_ms, config.max_delay_ms);
                    tracing::debug!(delay = ?delay, "Backing off");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(UplinkError::ConnectExhausted { attempts })
}

async fn connect_once(config: &LinkConfig) -> Result<TcpStream, UplinkError> {
    let address = &config.offshore_address;
    let stream = tokio::time::timeout(config.connect_timeout(), TcpStream::connect(address.as_str()))
        .await
        .map_err(|_| UplinkError::ConnectTimeout(address.clone()))?
        .map_err(|source| UplinkError::Connect {
            address: address.clone(),
            source,
        })?;

    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(error = %e, "Could not disable Nagle on link");
    }
    Ok(stream)
}
