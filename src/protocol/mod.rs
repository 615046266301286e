//! Wire protocol shared by both halves of the link.
//!
//! # Data Flow
//! ```text
//! Ship                                   Offshore
//!   Job → raw HTTP request
//!       → frame.rs (type 0) ──── TCP ───▶ frame.rs decode
//!                                          → dispatcher / forwarder
//!   frame.rs decode ◀──── TCP ──── frame.rs (type 1) ← raw HTTP response
//!
//! After a 2xx CONNECT response the same socket carries raw tunnel bytes
//! and is never framed again.
//! ```

pub mod frame;

pub use frame::{read_frame, write_frame, Frame, FrameError, MessageType, DEFAULT_MAX_FRAME_BYTES, HEADER_LEN};
