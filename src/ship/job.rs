//! Jobs: one queued proxy request and its single-fire completion.
//!
//! # Lifecycle
//! ```text
//! Job::new(request) → (Job, JobHandle)
//!     Job        → UplinkSession (consumed by Job::complete, exactly once)
//!     JobHandle  → local handler (JobHandle::wait with a deadline)
//! ```
//!
//! A result sent after the handle gave up is dropped on the spot; if it
//! carries a [`LinkLease`], dropping it releases the link back to the worker.

use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::oneshot;

use crate::http::RawRequest;

static JOB_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a job, in submission order per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    fn next() -> Self {
        Self(JOB_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Why a job produced no response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    /// The round trip over the link failed.
    #[error("link failure: {0}")]
    Link(String),

    /// The uplink worker is gone (shutdown) and nobody will answer.
    #[error("uplink session closed")]
    Closed,
}

/// What the offshore side sent back.
#[derive(Debug)]
pub enum JobResponse {
    /// Raw response bytes, to be written verbatim to the client.
    Complete(Bytes),
    /// A CONNECT was accepted. The link now belongs to the holder of the
    /// lease until it is dropped.
    Tunnel { response: Bytes, link: LinkLease },
}

pub type JobResult = Result<JobResponse, JobError>;

/// One pending proxied request, owned by the uplink worker.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    request: RawRequest,
    completion: oneshot::Sender<JobResult>,
}

impl Job {
    pub fn new(request: RawRequest) -> (Self, JobHandle) {
        let id = JobId::next();
        let (tx, rx) = oneshot::channel();
        let job = Self {
            id,
            request,
            completion: tx,
        };
        let handle = JobHandle {
            submitted: Instant::now(),
            rx,
        };
        (job, handle)
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn request(&self) -> &RawRequest {
        &self.request
    }

    /// Deliver the result. Consumes the job, so it can only happen once.
    ///
    /// Returns false when the waiter already gave up; the result has been
    /// dropped in that case.
    pub fn complete(self, result: JobResult) -> bool {
        let delivered = self.completion.send(result).is_ok();
        if !delivered {
            tracing::debug!(job_id = %self.id, "Late result discarded");
        }
        delivered
    }

    pub fn fail(self, error: JobError) -> bool {
        self.complete(Err(error))
    }
}

/// How a wait on a job ended.
#[derive(Debug)]
pub enum Completion {
    Response(JobResponse),
    Failed(JobError),
    TimedOut,
}

/// The waiting side of a job.
#[derive(Debug)]
pub struct JobHandle {
    submitted: Instant,
    rx: oneshot::Receiver<JobResult>,
}

impl JobHandle {
    pub fn submitted(&self) -> Instant {
        self.submitted
    }

    /// Wait for the result for at most `timeout`.
    ///
    /// A job whose sender is dropped without a result counts as failed.
    pub async fn wait(self, timeout: Duration) -> Completion {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(Ok(response))) => Completion::Response(response),
            Ok(Ok(Err(error))) => Completion::Failed(error),
            Ok(Err(_)) => Completion::Failed(JobError::Closed),
            Err(_) => Completion::TimedOut,
        }
    }
}

/// Exclusive, temporary ownership of the link after a successful CONNECT.
///
/// The stream is raw from here on and is never framed again. Dropping the
/// lease tells the uplink worker the tunnel is over.
#[derive(Debug)]
pub struct LinkLease {
    stream: TcpStream,
    _release: oneshot::Sender<()>,
}

impl LinkLease {
    /// Wrap `stream`; the receiver resolves once the lease is dropped.
    pub fn new(stream: TcpStream) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                stream,
                _release: tx,
            },
            rx,
        )
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::parse_head;

    fn get(target: &str) -> RawRequest {
        let raw = format!("GET {target} HTTP/1.1\r\nHost: example.com\r\n\r\n");
        let (head, _) = parse_head(raw.as_bytes()).unwrap().unwrap();
        RawRequest::new(head, Bytes::new())
    }

    #[test]
    fn ids_increase_in_creation_order() {
        let (a, _ha) = Job::new(get("/a"));
        let (b, _hb) = Job::new(get("/b"));
        assert!(a.id() < b.id());
    }

    #[tokio::test]
    async fn delivered_response_is_observed() {
        let (job, handle) = Job::new(get("/"));
        assert!(job.complete(Ok(JobResponse::Complete(Bytes::from_static(b"HTTP/1.1 200 OK\r\n\r\n")))));

        match handle.wait(Duration::from_secs(1)).await {
            Completion::Response(JobResponse::Complete(bytes)) => assert!(bytes.starts_with(b"HTTP/1.1 200")),
            other => panic!("unexpected completion: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn silent_job_times_out_once() {
        let (job, handle) = Job::new(get("/slow"));

        assert!(matches!(handle.wait(Duration::from_secs(60)).await, Completion::TimedOut));

        // The late answer goes nowhere and does not panic.
        assert!(!job.complete(Ok(JobResponse::Complete(Bytes::new()))));
    }

    #[tokio::test]
    async fn dropped_job_counts_as_failure() {
        let (job, handle) = Job::new(get("/"));
        drop(job);
        assert!(matches!(
            handle.wait(Duration::from_secs(1)).await,
            Completion::Failed(JobError::Closed)
        ));
    }

    #[tokio::test]
    async fn dropping_lease_releases_link() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stream = TcpStream::connect(addr).await.unwrap();

        let (lease, released) = LinkLease::new(stream);
        drop(lease);
        assert!(released.await.is_err());
    }
}
