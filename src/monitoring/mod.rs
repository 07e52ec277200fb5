//! Tunnel health monitoring
//!
//! This module inspects the kernel routing table and network reachability
//! while a tunnel session is active, and reports degraded state to
//! registered observers.

use std::time::SystemTime;

mod observer;
mod probe;
mod routes;
mod supervisor;

pub use observer::{Observer, ObserverSet, OBSERVER_QUEUE_CAPACITY};
pub use probe::{
    check_connectivity, parse_packet_loss, probe_connectivity, ConnectivityProbe,
    ConnectivityReport, ProbeFailure, ProbeFailureKind,
    SystemProbe,
};
pub use routes::{
    parse_route_table, FileRouteSource, RouteRecord, RouteSource, RouteTableInspector,
    PROC_NET_ROUTE,
};
pub use supervisor::{
    RetryPolicy, ShutdownSignal, SupervisorConfig, SupervisorState, SupervisorStatus,
    TunnelSupervisor,
};

/// Reachability of the public internet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// Not checked yet
    Unknown,
    /// Last check succeeded
    Up,
    /// Last check failed
    Down,
}

impl std::fmt::Display for Connectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

/// Current connectivity, refreshed every poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityState {
    /// Outcome of the latest check
    pub connectivity: Connectivity,
    /// When the latest check finished
    pub last_checked_at: Option<SystemTime>,
}

impl ConnectivityState {
    /// State before any check ran
    pub fn unknown() -> Self {
        Self {
            connectivity: Connectivity::Unknown,
            last_checked_at: None,
        }
    }

    /// Record the outcome of a check made now
    pub fn record(&mut self, up: bool) {
        self.connectivity = if up {
            Connectivity::Up
        } else {
            Connectivity::Down
        };
        self.last_checked_at = Some(SystemTime::now());
    }
}

impl Default for ConnectivityState {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Kind of supervision event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupervisionEventKind {
    /// Traffic is not routed through the tunnel
    TunnelNotDefaultRoute,
    /// The public internet is unreachable
    NoInternetConnection,
    /// The gateway does not answer
    NoGatewayConnection,
    /// All checks pass again after a failure
    Recovered,
}

impl std::fmt::Display for SupervisionEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TunnelNotDefaultRoute => write!(f, "tunnel_not_default_route"),
            Self::NoInternetConnection => write!(f, "no_internet_connection"),
            Self::NoGatewayConnection => write!(f, "no_gateway_connection"),
            Self::Recovered => write!(f, "recovered"),
        }
    }
}

/// Event pushed to observers; not retained by the supervisor
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisionEvent {
    /// Event kind
    pub kind: SupervisionEventKind,
    /// When the event was raised
    pub timestamp: SystemTime,
    /// Human-readable detail
    pub detail: String,
}

impl SupervisionEvent {
    /// Create an event stamped now
    pub fn new(kind: SupervisionEventKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            timestamp: SystemTime::now(),
            detail: detail.into(),
        }
    }

    /// Whether this event reports a degradation
    pub fn is_failure(&self) -> bool {
        self.kind != SupervisionEventKind::Recovered
    }
}
