//! Configuration loading from disk.

use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

use crate::config::schema::{OffshoreConfig, ShipConfig};
use crate::config::validation::{validate_offshore_config, validate_ship_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load a ship configuration from a TOML file.
///
/// Not validated yet: callers apply CLI overrides first, then validate.
pub fn load_ship_config(path: &Path) -> Result<ShipConfig, ConfigError> {
    load_toml(path)
}

/// Load an offshore configuration from a TOML file.
pub fn load_offshore_config(path: &Path) -> Result<OffshoreConfig, ConfigError> {
    load_toml(path)
}

/// Validate a ship configuration assembled from file and flags.
pub fn finalize_ship_config(config: ShipConfig) -> Result<ShipConfig, ConfigError> {
    validate_ship_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Validate an offshore configuration assembled from file and flags.
pub fn finalize_offshore_config(config: OffshoreConfig) -> Result<OffshoreConfig, ConfigError> {
    validate_offshore_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Replace the host and/or port of a `host:port` address.
///
/// Used for CLI flags that override one half of a configured address.
pub fn override_address(current: &str, host: Option<&str>, port: Option<u16>) -> String {
    let (current_host, current_port) = match current.rsplit_once(':') {
        Some((h, p)) => (h, p.to_string()),
        None => (current, String::new()),
    };
    let host = host.unwrap_or(current_host);
    let port = port.map(|p| p.to_string()).unwrap_or(current_port);

    // Bare IPv6 literals need brackets once a port follows.
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    toml::from_str(&content).map_err(ConfigError::Parse)
}
