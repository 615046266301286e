//! HTTP message handling subsystem.
//!
//! # Data Flow
//! ```text
//! Local client bytes
//!     → request.rs (parse head, delimit body)
//!     → Job → framed over the link as raw bytes
//!     → request.rs (parse again offshore)
//!     → headers.rs (strip hop-by-hop)
//!     → forwarder → response.rs (serialize)
//! ```
//!
//! # Design Decisions
//! - Messages stay as raw bytes on the wire; nothing is re-encoded in transit
//! - Header names keep their casing, lookups ignore it

pub mod headers;
pub mod request;
pub mod response;

pub use headers::Headers;
pub use request::{parse_head, HttpParseError, RawRequest, RequestHead};
pub use response::{RawResponse, CONNECTION_ESTABLISHED};
