//! Configuration validation functions
//!
//! This module provides validation for configuration fields such as
//! ports, addresses, file paths and daemon tuning values.

use crate::error::{EipAgentError, Result};
use std::net::IpAddr;
use std::path::Path;

/// Validate a TCP/UDP port
pub fn validate_port(port: u16) -> Result<()> {
    if port == 0 {
        return Err(EipAgentError::Config(
            "Port number cannot be 0".to_string(),
        ));
    }
    Ok(())
}

/// Validate IP address
pub fn validate_ip_address(ip: &str) -> Result<()> {
    ip.parse::<IpAddr>()
        .map_err(|_| EipAgentError::Config(format!("Invalid IP address: {}", ip)))?;
    Ok(())
}

/// Validate daemon verbosity (1-6)
pub fn validate_verbosity(verbosity: u8) -> Result<()> {
    if !(1..=6).contains(&verbosity) {
        return Err(EipAgentError::Config(format!(
            "Verbosity {} is out of valid range (1-6)",
            verbosity
        )));
    }
    Ok(())
}

/// Validate a percentage value (0-100)
pub fn validate_percent(value: f64) -> Result<()> {
    if !(0.0..=100.0).contains(&value) {
        return Err(EipAgentError::Config(format!(
            "Percentage {} is out of valid range (0-100)",
            value
        )));
    }
    Ok(())
}

/// Validate a file path is non-empty and valid UTF-8
pub fn validate_file_path(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(EipAgentError::Config(
            "File path cannot be empty".to_string(),
        ));
    }

    // Paths end up in the daemon's argv; keep them printable
    if path.to_str().is_none() {
        return Err(EipAgentError::Config(format!(
            "Invalid file path: {}",
            path.display()
        )));
    }

    Ok(())
}
