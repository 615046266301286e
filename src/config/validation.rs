//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: config → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::{OffshoreConfig, ShipConfig};

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

struct Checker {
    errors: Vec<ValidationError>,
}

impl Checker {
    fn new() -> Self {
        Self { errors: Vec::new() }
    }

    fn require(&mut self, ok: bool, field: &'static str, message: &str) {
        if !ok {
            self.errors.push(ValidationError {
                field,
                message: message.to_string(),
            });
        }
    }

    fn address(&mut self, value: &str, field: &'static str) {
        let ok = value
            .rsplit_once(':')
            .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
            .unwrap_or(false);
        self.require(ok, field, "expected host:port");
    }

    fn finish(self) -> Result<(), Vec<ValidationError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

pub fn validate_ship_config(config: &ShipConfig) -> Result<(), Vec<ValidationError>> {
    let mut c = Checker::new();

    c.address(&config.local.bind_address, "local.bind_address");
    c.require(config.local.max_connections > 0, "local.max_connections", "must be > 0");
    c.require(config.local.request_timeout_secs > 0, "local.request_timeout_secs", "must be > 0");
    c.require(config.local.max_header_bytes >= 1024, "local.max_header_bytes", "must be >= 1024");

    c.address(&config.link.offshore_address, "link.offshore_address");
    c.require(config.link.connect_attempts > 0, "link.connect_attempts", "must be > 0");
    c.require(config.link.connect_timeout_secs > 0, "link.connect_timeout_secs", "must be > 0");
    c.require(config.link.response_timeout_secs > 0, "link.response_timeout_secs", "must be > 0");
    c.require(
        config.link.max_delay_ms >= config.link.base_delay_ms,
        "link.max_delay_ms",
        "must be >= link.base_delay_ms",
    );
    c.require(
        config.link.max_frame_bytes <= u32::MAX as usize,
        "link.max_frame_bytes",
        "must fit in 32 bits",
    );

    if let Some(addr) = &config.observability.metrics_address {
        c.address(addr, "observability.metrics_address");
    }

    c.finish()
}

pub fn validate_offshore_config(config: &OffshoreConfig) -> Result<(), Vec<ValidationError>> {
    let mut c = Checker::new();

    c.address(&config.server.bind_address, "server.bind_address");
    c.require(config.server.max_connections > 0, "server.max_connections", "must be > 0");
    c.require(
        config.server.max_frame_bytes <= u32::MAX as usize,
        "server.max_frame_bytes",
        "must fit in 32 bits",
    );
    c.require(config.forward.request_timeout_secs > 0, "forward.request_timeout_secs", "must be > 0");
    c.require(config.forward.connect_timeout_secs > 0, "forward.connect_timeout_secs", "must be > 0");

    if let Some(addr) = &config.observability.metrics_address {
        c.address(addr, "observability.metrics_address");
    }

    c.finish()
}
