//! Routing table inspection
//!
//! Parses the kernel's IPv4 routing table in the `/proc/net/route` text
//! format and decides whether the tunnel interface carries the default path.
//!
//! OpenVPN's `redirect-gateway def1` does not replace `0.0.0.0/0`; it adds
//! `0.0.0.0/1` and `128.0.0.0/1`, which win by longest-prefix match. A record
//! therefore covers the default path when its destination is zero and its
//! prefix is at most one bit long.

use crate::error::{EipAgentError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

/// Location of the kernel routing table on Linux
pub const PROC_NET_ROUTE: &str = "/proc/net/route";

static DEFAULT_TUNNEL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(tun|tap)\d+$").expect("tunnel interface pattern is valid"));

/// One line of a routing-table snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRecord {
    /// Interface name
    pub interface: String,
    /// Destination, as printed by the kernel (host byte order)
    pub destination: u32,
    /// Gateway, as printed by the kernel (host byte order)
    pub gateway: u32,
    /// Route flags
    pub flags: u16,
    /// Route metric
    pub metric: u32,
    /// Netmask, as printed by the kernel (host byte order)
    pub mask: u32,
}

impl RouteRecord {
    /// Parse one data line
    ///
    /// Fields: Iface, Destination, Gateway, Flags, RefCnt, Use, Metric,
    /// Mask, MTU, Window, IRTT.
    pub fn parse_line(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 8 {
            return Err(EipAgentError::MalformedRouteTable(format!(
                "expected at least 8 fields, got {}: '{}'",
                fields.len(),
                line
            )));
        }

        Ok(Self {
            interface: fields[0].to_string(),
            destination: parse_hex_u32(fields[1], "destination")?,
            gateway: parse_hex_u32(fields[2], "gateway")?,
            flags: u16::from_str_radix(fields[3], 16).map_err(|_| {
                EipAgentError::MalformedRouteTable(format!("invalid flags '{}'", fields[3]))
            })?,
            metric: fields[6].parse().map_err(|_| {
                EipAgentError::MalformedRouteTable(format!("invalid metric '{}'", fields[6]))
            })?,
            mask: parse_hex_u32(fields[7], "mask")?,
        })
    }

    /// Strict default route: destination and mask both "any"
    pub fn is_default_route(&self) -> bool {
        self.destination == 0 && self.mask == 0
    }

    /// Whether this record takes over the default path
    pub fn covers_default_path(&self) -> bool {
        self.destination == 0 && self.prefix_len() <= 1
    }

    /// Netmask in dotted form
    pub fn netmask(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.mask.to_le_bytes())
    }

    /// Gateway in dotted form
    pub fn gateway_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.gateway.to_le_bytes())
    }

    /// Prefix length of the netmask
    pub fn prefix_len(&self) -> u32 {
        u32::from(self.netmask()).leading_ones()
    }
}

fn parse_hex_u32(field: &str, name: &str) -> Result<u32> {
    u32::from_str_radix(field, 16).map_err(|_| {
        EipAgentError::MalformedRouteTable(format!("invalid {} '{}'", name, field))
    })
}

/// Parse a full snapshot: one header line followed by data lines
pub fn parse_route_table(snapshot: &str) -> Result<Vec<RouteRecord>> {
    let mut lines = snapshot.lines();

    let header = lines
        .next()
        .filter(|line| !line.trim().is_empty())
        .ok_or_else(|| EipAgentError::MalformedRouteTable("empty snapshot".to_string()))?;

    if !header.trim_start().starts_with("Iface") {
        return Err(EipAgentError::MalformedRouteTable(format!(
            "unexpected header '{}'",
            header
        )));
    }

    lines
        .filter(|line| !line.trim().is_empty())
        .map(RouteRecord::parse_line)
        .collect()
}

/// Source of routing-table snapshots
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RouteSource: Send + Sync {
    /// Read the current routing table as text
    async fn snapshot(&self) -> Result<String>;
}

/// Reads snapshots from a file, `/proc/net/route` by default
#[derive(Debug, Clone)]
pub struct FileRouteSource {
    path: PathBuf,
}

impl FileRouteSource {
    /// Read from the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path snapshots are read from
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileRouteSource {
    fn default() -> Self {
        Self::new(PROC_NET_ROUTE)
    }
}

#[async_trait]
impl RouteSource for FileRouteSource {
    async fn snapshot(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            EipAgentError::Platform(format!(
                "Failed to read routing table {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

/// Decides whether the tunnel interface is the default route
pub struct RouteTableInspector {
    source: Box<dyn RouteSource>,
    tunnel_pattern: Regex,
}

impl RouteTableInspector {
    /// Inspector matching `tunN`/`tapN` interfaces
    pub fn new(source: Box<dyn RouteSource>) -> Self {
        Self {
            source,
            tunnel_pattern: DEFAULT_TUNNEL_PATTERN.clone(),
        }
    }

    /// Inspector reading `/proc/net/route`
    pub fn system() -> Self {
        Self::new(Box::new(FileRouteSource::default()))
    }

    /// Replace the tunnel interface name pattern
    pub fn with_tunnel_pattern(mut self, pattern: &str) -> Result<Self> {
        self.tunnel_pattern = Regex::new(pattern).map_err(|e| {
            EipAgentError::Config(format!("Invalid tunnel interface pattern '{}': {}", pattern, e))
        })?;
        Ok(self)
    }

    /// Whether an interface name looks like a tunnel device
    pub fn is_tunnel_interface(&self, name: &str) -> bool {
        self.tunnel_pattern.is_match(name)
    }

    /// Take a fresh snapshot and inspect it
    pub async fn check(&self) -> Result<RouteRecord> {
        let snapshot = self.source.snapshot().await?;
        self.inspect(&snapshot)
    }

    /// Inspect a snapshot
    ///
    /// Among records covering the default path the longest prefix wins,
    /// then the lowest metric, then table order.
    pub fn inspect(&self, snapshot: &str) -> Result<RouteRecord> {
        let records = parse_route_table(snapshot)?;

        let mut selected: Option<&RouteRecord> = None;
        for record in records.iter().filter(|r| r.covers_default_path()) {
            selected = match selected {
                Some(best)
                    if record.prefix_len() < best.prefix_len()
                        || (record.prefix_len() == best.prefix_len()
                            && record.metric >= best.metric) =>
                {
                    Some(best)
                }
                _ => Some(record),
            };
        }

        let route = selected.ok_or(EipAgentError::NoDefaultInterfaceFound)?;
        debug!(
            "Default path via {} (gateway {}, /{})",
            route.interface,
            route.gateway_addr(),
            route.prefix_len()
        );

        if !self.is_tunnel_interface(&route.interface) {
            return Err(EipAgentError::TunnelNotDefaultRoute(route.interface.clone()));
        }

        Ok(route.clone())
    }
}
