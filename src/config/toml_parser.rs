//! TOML configuration file parser
//!
//! The agent reads its own settings from a TOML file, by default
//! `/etc/eip-agent/config.toml`.

use crate::config::AgentConfig;
use crate::error::{EipAgentError, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

impl AgentConfig {
    /// Load and validate configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            EipAgentError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AgentConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration back to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| EipAgentError::Serialization(format!("Failed to serialize TOML: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceKind, Protocol};
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
[provider]
eip_config = "/etc/eip/eip.json"
eip_service_config = "/etc/eip/eip-service.json"
ca_cert = "/etc/eip/cacert.pem"
client_cert = "/etc/eip/openvpn.pem"
"#;

    #[test]
    fn test_parse_minimal_config() {
        let config = AgentConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.tunnel.port, 1194);
        assert_eq!(config.tunnel.protocol, Protocol::Udp);
        assert_eq!(config.tunnel.device, DeviceKind::Tun);
        assert_eq!(config.supervision.interval_secs, 10);
        assert!(config.management.socket_path.is_none());
        assert!(config.compat.gateway_placeholder.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = format!(
            r#"{}
[tunnel]
port = 443
protocol = "tcp"
verbosity = 3
user = "nobody"
group = "nogroup"

[management]
host = "localhost"
port = 7777

[supervision]
interval_secs = 5
startup_max_attempts = 30
ping_gateway = false

[compat]
gateway_placeholder = "testprovider.example.org"
"#,
            MINIMAL
        );

        let config = AgentConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(config.tunnel.port, 443);
        assert_eq!(config.tunnel.protocol, Protocol::Tcp);
        assert_eq!(config.tunnel.verbosity, Some(3));
        assert_eq!(config.tunnel.user.as_deref(), Some("nobody"));
        assert_eq!(config.management.port, Some(7777));
        assert_eq!(config.supervision.interval_secs, 5);
        assert_eq!(config.supervision.startup_max_attempts, Some(30));
        assert!(!config.supervision.ping_gateway);
        assert_eq!(
            config.compat.gateway_placeholder.as_deref(),
            Some("testprovider.example.org")
        );
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let toml_str = format!("{}\n[tunnel]\nport = 0\n", MINIMAL);
        assert!(AgentConfig::from_toml_str(&toml_str).is_err());

        assert!(AgentConfig::from_toml_str("[tunnel]\nport = 1194\n").is_err());
    }

    #[test]
    fn test_out_of_range_verbosity_is_not_fatal() {
        let toml_str = format!("{}\n[tunnel]\nverbosity = 9\n", MINIMAL);
        let config = AgentConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(config.tunnel.verbosity, Some(9));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = AgentConfig::from_file(file.path()).unwrap();
        assert_eq!(config.provider.ca_cert, PathBuf::from("/etc/eip/cacert.pem"));

        assert!(matches!(
            AgentConfig::from_file("/nonexistent/config.toml"),
            Err(EipAgentError::Config(_))
        ));
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = AgentConfig::from_toml_str(MINIMAL).unwrap();
        let serialized = config.to_toml_string().unwrap();
        let reparsed = AgentConfig::from_toml_str(&serialized).unwrap();
        assert_eq!(reparsed.provider.client_cert, config.provider.client_cert);
    }
}
