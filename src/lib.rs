//! Ship-to-shore HTTP/HTTPS proxy over a single framed TCP link.
//!
//! The ship side ([`ship`]) accepts ordinary proxy requests from local
//! clients and pushes them, one at a time, over one persistent link. The
//! offshore side ([`offshore`]) performs the real requests and answers on
//! the same link.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod offshore;
pub mod protocol;
pub mod resilience;
pub mod ship;

pub use config::{OffshoreConfig, ShipConfig};
pub use lifecycle::Shutdown;
pub use offshore::OffshoreDispatcher;
pub use ship::{LocalFrontend, UplinkSession};
