//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Link (re)connect on the ship:
//!     → backoff.rs (exponential delay between connect attempts)
//!     → attempts exhausted: pause, then start over
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every connect and link read has a deadline
//! - Jittered backoff prevents reconnect storms against the offshore host

pub mod backoff;

pub use backoff::calculate_backoff;
