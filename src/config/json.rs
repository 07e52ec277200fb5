//! Provider JSON documents
//!
//! `eip.json` carries the user's gateway preference and `eip-service.json`
//! the provider's advertised gateways and daemon options. Both are validated
//! upstream; here they are only deserialized.

use crate::error::{EipAgentError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// User-side eip configuration (`eip.json`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EipConfig {
    /// Cluster name of the preferred gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_gateway: Option<String>,
}

/// Provider-advertised service configuration (`eip-service.json`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EipServiceConfig {
    /// Advertised gateways
    #[serde(default)]
    pub gateways: Vec<GatewayDescriptor>,

    /// Daemon options suggested by the provider. Only cipher related keys
    /// are ever honoured.
    #[serde(default)]
    pub openvpn_configuration: BTreeMap<String, serde_json::Value>,

    /// Document serial
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<u32>,

    /// Document version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

/// One provider-advertised gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayDescriptor {
    /// Cluster the gateway belongs to
    #[serde(rename = "cluster")]
    pub cluster_name: String,

    /// Gateway address; empty when the provider omitted it
    #[serde(default)]
    pub ip_address: String,
}

impl GatewayDescriptor {
    /// Create a gateway descriptor
    pub fn new(cluster_name: impl Into<String>, ip_address: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            ip_address: ip_address.into(),
        }
    }
}

impl EipConfig {
    /// Load from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_json(path.as_ref())
    }

    /// Parse from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            EipAgentError::Serialization(format!("Failed to parse eip configuration: {}", e))
        })
    }
}

impl EipServiceConfig {
    /// Load from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_json(path.as_ref())
    }

    /// Parse from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            EipAgentError::Serialization(format!(
                "Failed to parse eip service configuration: {}",
                e
            ))
        })
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| {
        EipAgentError::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        EipAgentError::Serialization(format!("Failed to parse {}: {}", path.display(), e))
    })
}
