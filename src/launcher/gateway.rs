//! Gateway and cipher selection
//!
//! The gateway is the first advertised descriptor whose cluster matches the
//! primary cluster from `eip.json`, compared exactly. Cipher options come
//! from the provider's `openvpn_configuration`, restricted to a small
//! allow-list of keys and to values made of uppercase letters, digits and
//! hyphens.

use crate::config::{EipConfig, EipServiceConfig, GatewayDescriptor};
use crate::error::{EipAgentError, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Keys accepted from `openvpn_configuration`, in emission order
pub const CIPHER_KEYS: [&str; 3] = ["auth", "cipher", "tls-cipher"];

static CIPHER_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z0-9\-]+").expect("cipher value pattern is valid"));

/// Pick the gateway for the primary cluster
///
/// With a `placeholder`, an unset primary cluster or an empty gateway list
/// yields a descriptor pointing at the placeholder host instead of an error.
/// An unmatched cluster is always an error.
pub fn resolve_gateway(
    eip: &EipConfig,
    service: &EipServiceConfig,
    placeholder: Option<&str>,
) -> Result<GatewayDescriptor> {
    let primary = match eip.primary_gateway.as_deref().filter(|c| !c.is_empty()) {
        Some(primary) => primary,
        None => {
            return placeholder_or(placeholder, "", EipAgentError::NoPrimaryGatewayConfigured)
        }
    };

    if service.gateways.is_empty() {
        warn!("Service configuration lists no gateways");
        return placeholder_or(placeholder, primary, EipAgentError::GatewayListEmpty);
    }

    let gateway = service
        .gateways
        .iter()
        .find(|gw| gw.cluster_name == primary)
        .cloned()
        .ok_or_else(|| EipAgentError::GatewayNotFound(primary.to_string()))?;

    debug!(
        "Using gateway {} of cluster {}",
        gateway.ip_address, gateway.cluster_name
    );
    Ok(gateway)
}

fn placeholder_or(
    placeholder: Option<&str>,
    cluster: &str,
    err: EipAgentError,
) -> Result<GatewayDescriptor> {
    match placeholder {
        Some(host) => {
            warn!("{}; falling back to placeholder gateway {}", err, host);
            Ok(GatewayDescriptor::new(cluster, host))
        }
        None => Err(err),
    }
}

/// Cipher options passed to the daemon
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CipherSuite {
    /// HMAC digest (`--auth`)
    pub auth: Option<String>,
    /// Data channel cipher (`--cipher`)
    pub cipher: Option<String>,
    /// Control channel cipher list (`--tls-cipher`)
    pub tls_cipher: Option<String>,
}

impl CipherSuite {
    /// Derive from a provider's `openvpn_configuration`
    ///
    /// Unknown keys are ignored. Values without an acceptable token are
    /// dropped with a warning; otherwise the first acceptable token is kept.
    pub fn from_openvpn_configuration(config: &BTreeMap<String, serde_json::Value>) -> Self {
        let mut suite = Self::default();

        for (key, value) in config {
            let slot = match key.as_str() {
                "auth" => &mut suite.auth,
                "cipher" => &mut suite.cipher,
                "tls-cipher" => &mut suite.tls_cipher,
                _ => {
                    debug!("Ignoring openvpn option '{}'", key);
                    continue;
                }
            };

            let Some(raw) = value.as_str() else {
                warn!("Dropping non-string value for openvpn option '{}'", key);
                continue;
            };

            match CIPHER_VALUE.find(raw) {
                Some(token) => {
                    if token.as_str() != raw {
                        warn!(
                            "Openvpn option '{}' value '{}' reduced to '{}'",
                            key,
                            raw,
                            token.as_str()
                        );
                    }
                    *slot = Some(token.as_str().to_string());
                }
                None => warn!("Dropping malformed value '{}' for openvpn option '{}'", raw, key),
            }
        }

        suite
    }

    /// Options as `(key, value)` pairs in emission order
    pub fn options(&self) -> Vec<(&'static str, &str)> {
        CIPHER_KEYS
            .iter()
            .zip([&self.auth, &self.cipher, &self.tls_cipher])
            .filter_map(|(key, value)| value.as_deref().map(|v| (*key, v)))
            .collect()
    }

    /// Whether no cipher option is set
    pub fn is_empty(&self) -> bool {
        self.auth.is_none() && self.cipher.is_none() && self.tls_cipher.is_none()
    }
}
