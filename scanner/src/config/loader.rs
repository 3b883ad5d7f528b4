//! Configuration loading utilities for the scanner.
//!
//! This module provides functions for reading and parsing
//! configuration files from disk.

use std::path::Path;

use eyre::WrapErr as _;
use tokio::fs;

use super::{ConfigError, ScannerConfig};

/// Parses settings text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the text is not valid TOML or does not match the schema,
/// and [`ConfigError::Invalid`] if a value is out of range.
pub fn parse(text: &str) -> Result<ScannerConfig, ConfigError> {
    let config: ScannerConfig = toml::from_str(text)?;
    config.validate().map_err(ConfigError::Invalid)?;
    Ok(config)
}

/// Reads and parses the scanner config from a TOML file.
///
/// # Arguments
///
/// * `path` - File path to the TOML configuration file.
///
/// # Errors
///
/// Returns an error if the config file cannot be read or parsed.
pub async fn load<P: AsRef<Path>>(path: P) -> eyre::Result<ScannerConfig> {
    let path_ref = path.as_ref();
    let content = fs::read_to_string(path_ref).await.wrap_err(format!(
        "Failed to read config file at: {}",
        path_ref.display()
    ))?;
    let config = parse(&content).wrap_err(format!(
        "Failed to parse config as TOML at: {}",
        path_ref.display()
    ))?;
    Ok(config)
}
