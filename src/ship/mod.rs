//! Ship-side proxy.
//!
//! # Data Flow
//! ```text
//! Client connection
//!     → frontend.rs (read request, build Job)
//!     → uplink.rs (FIFO queue, single worker, one link)
//!     → offshore over the framed link
//!     → job.rs (completion back to the waiting client)
//! ```
//!
//! # Design Decisions
//! - Exactly one request is on the link at any time, in arrival order
//! - A successful CONNECT takes the link out of service for good; the
//!   worker waits for the tunnel to end and then dials a new link

pub mod frontend;
pub mod job;
pub mod uplink;

pub use frontend::LocalFrontend;
pub use job::{Completion, Job, JobError, JobHandle, JobId, JobResponse, LinkLease};
pub use uplink::{connect_with_retry, UplinkError, UplinkSession};
