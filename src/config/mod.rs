//! Configuration management
//!
//! This module handles the agent's own TOML configuration file and the
//! provider-supplied JSON documents (`eip.json`, `eip-service.json`) that
//! describe gateways and cipher preferences.

mod json;
mod toml_parser;
mod validation;

pub use json::{EipConfig, EipServiceConfig, GatewayDescriptor};
pub use validation::{
    validate_file_path, validate_ip_address, validate_percent, validate_port,
    validate_verbosity,
};

use crate::error::{EipAgentError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Provider bundle and credential locations
    pub provider: ProviderConfig,

    /// Tunnel daemon options
    #[serde(default)]
    pub tunnel: TunnelConfig,

    /// Management interface of the daemon
    #[serde(default)]
    pub management: ManagementConfig,

    /// Health supervision settings
    #[serde(default)]
    pub supervision: SupervisionConfig,

    /// Backward compatibility switches
    #[serde(default)]
    pub compat: CompatConfig,
}

/// Provider bundle and credential locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Root of a standalone bundle. Bundled daemons live under
    /// `<prefix>/../apps/eip` and shared libraries under `<prefix>/../lib`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<PathBuf>,

    /// Path to eip.json
    pub eip_config: PathBuf,

    /// Path to eip-service.json
    pub eip_service_config: PathBuf,

    /// Provider CA certificate
    pub ca_cert: PathBuf,

    /// Client certificate
    pub client_cert: PathBuf,

    /// Client private key. Provider bundles ship the key in the same PEM as
    /// the certificate, so this defaults to `client_cert`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<PathBuf>,
}

/// Transport protocol towards the gateway
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// UDP transport
    #[default]
    Udp,
    /// TCP transport
    Tcp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Udp => write!(f, "udp"),
            Self::Tcp => write!(f, "tcp"),
        }
    }
}

/// Virtual device flavour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Layer 3 device
    #[default]
    Tun,
    /// Layer 2 device
    Tap,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tun => write!(f, "tun"),
            Self::Tap => write!(f, "tap"),
        }
    }
}

/// Tunnel daemon options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Gateway port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Gateway protocol
    #[serde(default = "default_protocol")]
    pub protocol: Protocol,

    /// Device kind
    #[serde(default = "default_device")]
    pub device: DeviceKind,

    /// Daemon log verbosity (1-6); other levels are ignored with a warning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<u8>,

    /// User the daemon drops to; the invoking user when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Group the daemon drops to; the invoking user's group when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// DNS up/down script
    #[serde(default = "default_up_down_script")]
    pub up_down_script: PathBuf,

    /// down-root plugin used to run the down script with privileges
    #[serde(default = "default_down_root_plugin")]
    pub down_root_plugin: PathBuf,

    /// Daemon log file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

/// Management interface configuration
///
/// A socket path selects the unix transport; host and port select TCP.
/// With neither, the platform default is used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagementConfig {
    /// Unix socket path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,

    /// TCP host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// TCP port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Supervision settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisionConfig {
    /// Seconds between supervision polls
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Seconds between route checks while waiting for the tunnel to come up
    #[serde(default = "default_startup_retry_secs")]
    pub startup_retry_secs: u64,

    /// Give up waiting for the first tunnel-up after this many attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_max_attempts: Option<u32>,

    /// Endpoint used for the internet reachability check
    #[serde(default = "default_probe_url")]
    pub probe_url: String,

    /// Timeout of the internet reachability check
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Highest tolerated echo packet loss towards the gateway, in percent
    #[serde(default = "default_max_packet_loss")]
    pub max_packet_loss: f64,

    /// Echo requests sent per gateway check
    #[serde(default = "default_ping_count")]
    pub ping_count: u32,

    /// Whether the gateway check runs at all
    #[serde(default = "default_true")]
    pub ping_gateway: bool,
}

/// Backward compatibility switches
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompatConfig {
    /// Address used when no primary cluster or no gateway list is configured.
    /// Unset means those cases are errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_placeholder: Option<String>,
}

impl AgentConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        self.provider.validate()?;
        self.tunnel.validate()?;
        self.management.validate()?;
        self.supervision.validate()?;
        Ok(())
    }
}

impl ProviderConfig {
    /// Client key path, falling back to the client certificate
    pub fn client_key(&self) -> &PathBuf {
        self.client_key.as_ref().unwrap_or(&self.client_cert)
    }

    /// Directory searched for a bundled daemon
    pub fn bundled_bin_dir(&self) -> Option<PathBuf> {
        self.path_prefix
            .as_ref()
            .map(|prefix| prefix.join("..").join("apps").join("eip"))
    }

    /// Directory holding bundled shared libraries
    pub fn bundled_lib_dir(&self) -> Option<PathBuf> {
        self.path_prefix
            .as_ref()
            .map(|prefix| prefix.join("..").join("lib"))
    }

    /// Validate provider configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_file_path(&self.eip_config)?;
        validation::validate_file_path(&self.eip_service_config)?;
        validation::validate_file_path(&self.ca_cert)?;
        validation::validate_file_path(&self.client_cert)?;
        if let Some(key) = &self.client_key {
            validation::validate_file_path(key)?;
        }
        Ok(())
    }
}

impl TunnelConfig {
    /// Validate tunnel configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_port(self.port)?;
        for name in [&self.user, &self.group].into_iter().flatten() {
            if name.is_empty() {
                return Err(EipAgentError::Config(
                    "User and group names cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl ManagementConfig {
    /// Validate management configuration
    pub fn validate(&self) -> Result<()> {
        if self.socket_path.is_some() && (self.host.is_some() || self.port.is_some()) {
            return Err(EipAgentError::Config(
                "Management socket_path cannot be combined with host/port".to_string(),
            ));
        }
        match (&self.host, self.port) {
            (Some(host), Some(port)) => {
                if host.is_empty() {
                    return Err(EipAgentError::Config(
                        "Management host cannot be empty".to_string(),
                    ));
                }
                validation::validate_port(port)
            }
            (None, None) => Ok(()),
            _ => Err(EipAgentError::Config(
                "Management host and port must be set together".to_string(),
            )),
        }
    }
}

impl SupervisionConfig {
    /// Validate supervision configuration
    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            return Err(EipAgentError::Config(
                "Supervision interval must be at least 1 second".to_string(),
            ));
        }
        if self.startup_retry_secs == 0 {
            return Err(EipAgentError::Config(
                "Startup retry interval must be at least 1 second".to_string(),
            ));
        }
        if self.probe_url.is_empty() {
            return Err(EipAgentError::Config("Probe URL cannot be empty".to_string()));
        }
        if self.ping_count == 0 {
            return Err(EipAgentError::Config("Ping count cannot be 0".to_string()));
        }
        validation::validate_percent(self.max_packet_loss)?;
        Ok(())
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            protocol: default_protocol(),
            device: default_device(),
            verbosity: None,
            user: None,
            group: None,
            up_down_script: default_up_down_script(),
            down_root_plugin: default_down_root_plugin(),
            log_file: None,
        }
    }
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            startup_retry_secs: default_startup_retry_secs(),
            startup_max_attempts: None,
            probe_url: default_probe_url(),
            probe_timeout_secs: default_probe_timeout_secs(),
            max_packet_loss: default_max_packet_loss(),
            ping_count: default_ping_count(),
            ping_gateway: true,
        }
    }
}

// Default value functions for serde
fn default_port() -> u16 {
    1194
}

fn default_protocol() -> Protocol {
    Protocol::Udp
}

fn default_device() -> DeviceKind {
    DeviceKind::Tun
}

fn default_up_down_script() -> PathBuf {
    PathBuf::from("/etc/leap/resolv-update")
}

fn default_down_root_plugin() -> PathBuf {
    PathBuf::from("/usr/lib/openvpn/openvpn-down-root.so")
}

fn default_interval_secs() -> u64 {
    10
}

fn default_startup_retry_secs() -> u64 {
    1
}

fn default_probe_url() -> String {
    "https://www.google.com".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_max_packet_loss() -> f64 {
    10.0
}

fn default_ping_count() -> u32 {
    5
}

fn default_true() -> bool {
    true
}
