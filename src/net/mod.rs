//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (identity, live-connection tracking)
//!     → Hand off to the ship frontend or the offshore dispatcher
//!
//! CONNECT tunnels:
//!     → relay.rs (raw bidirectional copy between two sockets)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - Relays never inspect the bytes they move

pub mod connection;
pub mod listener;
pub mod relay;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
pub use relay::{relay, RelayStats};
