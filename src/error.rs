//! Error types for eip-agent
//!
//! This module defines the error types used throughout the application.
//! We use `thiserror` for ergonomic error definitions and `anyhow` for
//! error propagation in application code.
//!
//! Errors fall into two families. Launch-path errors abort a connection
//! attempt before any process is spawned. Supervision errors are advisory:
//! they are turned into events for observers and the poll loop carries on.

use crate::monitoring::SupervisionEventKind;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for eip-agent operations
#[derive(Error, Debug)]
pub enum EipAgentError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Platform-specific errors (process table, routing table access)
    #[error("Platform error: {0}")]
    Platform(String),

    /// The eip configuration does not name a primary gateway cluster
    #[error("No primary gateway cluster configured")]
    NoPrimaryGatewayConfigured,

    /// The service configuration advertises no gateways at all
    #[error("Service configuration lists no gateways")]
    GatewayListEmpty,

    /// No advertised gateway belongs to the primary cluster
    #[error("No gateway found for cluster '{0}'")]
    GatewayNotFound(String),

    /// A required tunnel option is absent
    #[error("Incomplete tunnel options: missing {0}")]
    IncompleteTunnelOptions(String),

    /// The privilege elevation binary is not on the search path
    #[error("Elevation mechanism not found: {0}")]
    ElevationMechanismNotFound(String),

    /// Elevation exists but no interactive authentication agent is running
    #[error("No polkit authentication agent is running")]
    NoAuthenticationAgentAvailable,

    /// The tunneling daemon could not be resolved
    #[error("Tunnel daemon binary not found: {0}")]
    TunnelBinaryNotFound(String),

    /// A certificate or key file is absent
    #[error("Key file not found: {}", .0.display())]
    MissingKeyFile(PathBuf),

    /// A certificate or key file has unsafe permissions that could not be repaired
    #[error("Unsafe permissions on key file: {}", .0.display())]
    BadKeyFilePermissions(PathBuf),

    /// The routing table has no entry covering the default path
    #[error("No default route found in routing table")]
    NoDefaultInterfaceFound,

    /// The default path goes through a non-tunnel interface
    #[error("Tunnel is not the default route (default route via '{0}')")]
    TunnelNotDefaultRoute(String),

    /// The routing table snapshot could not be parsed
    #[error("Malformed routing table: {0}")]
    MalformedRouteTable(String),

    /// The public internet is unreachable
    #[error("No internet connection: {0}")]
    NoInternetConnection(String),

    /// The gateway does not answer echo requests
    #[error("No connection to gateway {0}")]
    NoGatewayConnection(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid state errors
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl EipAgentError {
    /// Whether this error must abort a connection attempt.
    ///
    /// `BadKeyFilePermissions` is only raised after the repair pass failed,
    /// so it is fatal as well.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::NoDefaultInterfaceFound
                | Self::TunnelNotDefaultRoute(_)
                | Self::MalformedRouteTable(_)
                | Self::NoInternetConnection(_)
                | Self::NoGatewayConnection(_)
        )
    }

    /// Event kind an advisory supervision error is reported as, if any
    pub fn supervision_kind(&self) -> Option<SupervisionEventKind> {
        match self {
            Self::NoDefaultInterfaceFound
            | Self::TunnelNotDefaultRoute(_)
            | Self::MalformedRouteTable(_) => Some(SupervisionEventKind::TunnelNotDefaultRoute),
            Self::NoInternetConnection(_) => Some(SupervisionEventKind::NoInternetConnection),
            Self::NoGatewayConnection(_) => Some(SupervisionEventKind::NoGatewayConnection),
            _ => None,
        }
    }
}

/// Result type alias using EipAgentError
pub type Result<T> = std::result::Result<T, EipAgentError>;

impl From<serde_json::Error> for EipAgentError {
    fn from(err: serde_json::Error) -> Self {
        EipAgentError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for EipAgentError {
    fn from(err: toml::de::Error) -> Self {
        EipAgentError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_errors_are_fatal() {
        assert!(EipAgentError::GatewayListEmpty.is_fatal());
        assert!(EipAgentError::NoAuthenticationAgentAvailable.is_fatal());
        assert!(EipAgentError::MissingKeyFile(PathBuf::from("/tmp/ca.crt")).is_fatal());
        assert!(EipAgentError::BadKeyFilePermissions(PathBuf::from("/tmp/ca.crt")).is_fatal());
    }

    #[test]
    fn test_supervision_errors_are_advisory() {
        let err = EipAgentError::NoInternetConnection("timed out".to_string());
        assert!(!err.is_fatal());
        assert_eq!(
            err.supervision_kind(),
            Some(SupervisionEventKind::NoInternetConnection)
        );

        assert_eq!(
            EipAgentError::NoDefaultInterfaceFound.supervision_kind(),
            Some(SupervisionEventKind::TunnelNotDefaultRoute)
        );
        assert_eq!(EipAgentError::GatewayListEmpty.supervision_kind(), None);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            EipAgentError::GatewayNotFound("c2".to_string()).to_string(),
            "No gateway found for cluster 'c2'"
        );
        assert_eq!(
            EipAgentError::TunnelNotDefaultRoute("wlan0".to_string()).to_string(),
            "Tunnel is not the default route (default route via 'wlan0')"
        );
    }
}
