//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → CLI flag overrides (binaries)
//!     → validation.rs (semantic checks)
//!     → ShipConfig / OffshoreConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{
    finalize_offshore_config, finalize_ship_config, load_offshore_config, load_ship_config,
    override_address, ConfigError,
};
pub use schema::{
    ForwardConfig, LinkConfig, LocalConfig, ObservabilityConfig, OffshoreConfig, ServerConfig,
    ShipConfig, ShutdownConfig, TunnelConfig,
};
