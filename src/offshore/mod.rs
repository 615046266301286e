//! Offshore egress proxy.
//!
//! # Data Flow
//! ```text
//! Ship link (framed)
//!     → dispatcher.rs (one task per link, one frame at a time)
//!     → forwarder.rs (origin request via reqwest)   or
//!       connect.rs  (dial CONNECT target, then raw relay)
//!     → response frame back over the same link
//! ```

pub mod connect;
pub mod dispatcher;
pub mod forwarder;

pub use connect::{open_target, parse_target, TargetError};
pub use dispatcher::OffshoreDispatcher;
pub use forwarder::{resolve_target, ForwardError, HttpForwarder};
