//! eip-agent: encrypted tunnel launch and supervision
//!
//! This library prepares a least-privilege invocation of an external tunnel
//! daemon (OpenVPN) for a provider gateway, and supervises the established
//! session by inspecting the kernel routing table and network reachability.
//!
//! # Architecture
//!
//! Launching is a synchronous, fail-fast pipeline: gateway resolution, key
//! checks, option assembly, privilege escalation checks, daemon lookup and
//! directive construction. Nothing is spawned until every step passes.
//! Supervision runs as an independent task and reports degraded state to
//! registered observers without tearing the session down.
//!
//! # Modules
//!
//! - `config`: Agent (TOML) and provider (JSON) configuration
//! - `launcher`: Gateway selection, tunnel options, argument building, launch pipeline
//! - `platform`: Per-OS launch behavior and executable search
//! - `security`: Key file permissions and privilege escalation checks
//! - `monitoring`: Routing table inspection, connectivity probes, supervisor
//! - `error`: Error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod launcher;
pub mod monitoring;
pub mod platform;
pub mod security;

// Re-export commonly used types
pub use error::{EipAgentError, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
