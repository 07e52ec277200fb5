//! Network reachability checks
//!
//! Two independent checks: an HTTP request to a well-known endpoint for the
//! public internet, and ICMP echo (through the system `ping`) for the
//! gateway. Expected network conditions come back as typed failures.

use crate::config::SupervisionConfig;
use crate::error::{EipAgentError, Result};
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Class of an internet check failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeFailureKind {
    /// No route to the destination host or network
    NoRouteToHost,
    /// The request timed out
    Timeout,
    /// The connection was refused
    ConnectionRefused,
    /// The endpoint answered with an error status
    HttpStatus,
    /// Anything else
    Other,
}

impl std::fmt::Display for ProbeFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoRouteToHost => write!(f, "no route to host"),
            Self::Timeout => write!(f, "timed out"),
            Self::ConnectionRefused => write!(f, "connection refused"),
            Self::HttpStatus => write!(f, "bad status"),
            Self::Other => write!(f, "request failed"),
        }
    }
}

/// Failure of the internet check
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct ProbeFailure {
    /// Failure class
    pub kind: ProbeFailureKind,
    /// Underlying error text
    pub detail: String,
}

impl ProbeFailure {
    /// Create a failure
    pub fn new(kind: ProbeFailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    fn from_reqwest(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ProbeFailureKind::Timeout
        } else if err.is_status() {
            ProbeFailureKind::HttpStatus
        } else {
            classify_error_chain(err)
        };
        Self::new(kind, err.to_string())
    }
}

fn classify_error_chain(err: &(dyn std::error::Error + 'static)) -> ProbeFailureKind {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<std::io::Error>() {
            if let Some(kind) = classify_io_error(io_err) {
                return kind;
            }
        }
        if e.to_string().contains("No route to host") {
            return ProbeFailureKind::NoRouteToHost;
        }
        current = e.source();
    }
    ProbeFailureKind::Other
}

/// Classify a socket-level error
pub(crate) fn classify_io_error(err: &std::io::Error) -> Option<ProbeFailureKind> {
    if let Some(code) = err.raw_os_error() {
        if is_unreachable_errno(code) {
            return Some(ProbeFailureKind::NoRouteToHost);
        }
    }
    match err.kind() {
        std::io::ErrorKind::ConnectionRefused => Some(ProbeFailureKind::ConnectionRefused),
        std::io::ErrorKind::TimedOut => Some(ProbeFailureKind::Timeout),
        _ => None,
    }
}

#[cfg(unix)]
fn is_unreachable_errno(code: i32) -> bool {
    code == libc::EHOSTUNREACH || code == libc::ENETUNREACH
}

#[cfg(not(unix))]
fn is_unreachable_errno(code: i32) -> bool {
    // WSAEHOSTUNREACH, WSAENETUNREACH
    code == 10065 || code == 10051
}

/// Reachability checks used by the supervisor
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Check that the public internet answers
    async fn check_internet(&self) -> std::result::Result<(), ProbeFailure>;

    /// Check that the gateway answers echo requests
    async fn check_gateway(&self, gateway: &str) -> Result<()>;
}

/// Outcome of one connectivity check
#[derive(Debug)]
pub struct ConnectivityReport {
    /// Internet check; `NoInternetConnection` on failure
    pub internet: Result<()>,
    /// Gateway check, when it already ran as part of this check
    pub gateway: Option<Result<()>>,
}

/// Run the internet check, consulting the gateway on routing failures
///
/// When the internet check fails with "no route to host" and a gateway is
/// known, the gateway is pinged as well so the logs tell a dead network
/// apart from a broken gateway path. The result is `NoInternetConnection`
/// either way.
pub async fn check_connectivity(
    probe: &dyn ConnectivityProbe,
    gateway: Option<&str>,
) -> Result<()> {
    probe_connectivity(probe, gateway).await.internet
}

/// Like [`check_connectivity`], also returning the gateway result if the
/// gateway was pinged
pub async fn probe_connectivity(
    probe: &dyn ConnectivityProbe,
    gateway: Option<&str>,
) -> ConnectivityReport {
    let failure = match probe.check_internet().await {
        Ok(()) => {
            return ConnectivityReport {
                internet: Ok(()),
                gateway: None,
            }
        }
        Err(failure) => failure,
    };

    let mut gateway_result = None;
    if failure.kind == ProbeFailureKind::NoRouteToHost {
        if let Some(gateway) = gateway {
            let result = probe.check_gateway(gateway).await;
            match &result {
                Ok(()) => info!("Gateway {} reachable while internet is not", gateway),
                Err(e) => warn!("Gateway check after routing failure: {}", e),
            }
            gateway_result = Some(result);
        }
    }

    ConnectivityReport {
        internet: Err(EipAgentError::NoInternetConnection(failure.to_string())),
        gateway: gateway_result,
    }
}

/// Probe backed by an HTTP client and the system `ping`
pub struct SystemProbe {
    client: reqwest::Client,
    url: String,
    ping_count: u32,
    max_packet_loss: f64,
}

impl SystemProbe {
    /// Create a probe
    pub fn new(url: impl Into<String>, timeout: Duration, ping_count: u32, max_packet_loss: f64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EipAgentError::Platform(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            ping_count,
            max_packet_loss,
        })
    }

    /// Create a probe from supervision settings
    pub fn from_config(config: &SupervisionConfig) -> Result<Self> {
        Self::new(
            config.probe_url.clone(),
            Duration::from_secs(config.probe_timeout_secs),
            config.ping_count,
            config.max_packet_loss,
        )
    }

    fn ping_args(&self, gateway: &str) -> Vec<String> {
        let count = self.ping_count.to_string();
        if cfg!(target_os = "windows") {
            vec!["-n".to_string(), count, gateway.to_string()]
        } else if cfg!(target_os = "linux") {
            vec![
                "-c".to_string(),
                count,
                "-W".to_string(),
                "1".to_string(),
                gateway.to_string(),
            ]
        } else {
            vec!["-c".to_string(), count, gateway.to_string()]
        }
    }
}

#[async_trait]
impl ConnectivityProbe for SystemProbe {
    async fn check_internet(&self) -> std::result::Result<(), ProbeFailure> {
        debug!("Checking internet connection via {}", self.url);
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ProbeFailure::from_reqwest(&e))?;

        response
            .error_for_status()
            .map(|_| ())
            .map_err(|e| ProbeFailure::from_reqwest(&e))
    }

    async fn check_gateway(&self, gateway: &str) -> Result<()> {
        // Never hand anything but an address to ping's argv
        if gateway.parse::<IpAddr>().is_err() {
            warn!("Refusing to ping '{}': not an IP address", gateway);
            return Err(EipAgentError::NoGatewayConnection(gateway.to_string()));
        }

        let output = Command::new("ping")
            .args(self.ping_args(gateway))
            .output()
            .await
            .map_err(|e| {
                warn!("Failed to run ping: {}", e);
                EipAgentError::NoGatewayConnection(gateway.to_string())
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let loss = parse_packet_loss(&stdout).unwrap_or(100.0);
        debug!("Packet loss to gateway {}: {}%", gateway, loss);

        if loss > self.max_packet_loss {
            return Err(EipAgentError::NoGatewayConnection(gateway.to_string()));
        }
        Ok(())
    }
}

/// Extract the packet loss percentage from a `ping` summary
pub fn parse_packet_loss(output: &str) -> Option<f64> {
    output
        .lines()
        .filter(|line| line.contains("loss"))
        .flat_map(|line| {
            line.split(|c: char| c.is_whitespace() || c == ',' || c == '(' || c == ')')
        })
        .find_map(|token| token.strip_suffix('%')?.parse::<f64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_packet_loss_linux() {
        let output = "PING 4.2.2.2 (4.2.2.2) 56(84) bytes of data.\n\n\
            --- 4.2.2.2 ping statistics ---\n\
            5 packets transmitted, 4 received, 20% packet loss, time 4006ms\n\
            rtt min/avg/max/mdev = 11.1/12.0/13.2/0.7 ms\n";
        assert_eq!(parse_packet_loss(output), Some(20.0));
    }

    #[test]
    fn test_parse_packet_loss_macos() {
        let output = "--- 4.2.2.2 ping statistics ---\n\
            5 packets transmitted, 5 packets received, 0.0% packet loss\n";
        assert_eq!(parse_packet_loss(output), Some(0.0));
    }

    #[test]
    fn test_parse_packet_loss_windows() {
        let output = "Ping statistics for 4.2.2.2:\n\
            \x20   Packets: Sent = 4, Received = 0, Lost = 4 (100% loss),\n";
        assert_eq!(parse_packet_loss(output), Some(100.0));
    }

    #[test]
    fn test_parse_packet_loss_garbage() {
        assert_eq!(parse_packet_loss(""), None);
        assert_eq!(parse_packet_loss("ping: unknown host"), None);
    }

    #[test]
    fn test_classify_io_error() {
        let refused = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
        assert_eq!(
            classify_io_error(&refused),
            Some(ProbeFailureKind::ConnectionRefused)
        );

        #[cfg(unix)]
        {
            let unreachable = std::io::Error::from_raw_os_error(libc::EHOSTUNREACH);
            assert_eq!(
                classify_io_error(&unreachable),
                Some(ProbeFailureKind::NoRouteToHost)
            );
        }

        let other = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(classify_io_error(&other), None);
    }

    #[test]
    fn test_classify_error_chain_by_message() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "[Errno 113] No route to host");
        assert_eq!(classify_error_chain(&err), ProbeFailureKind::NoRouteToHost);
    }

    #[tokio::test]
    async fn test_connectivity_ok() {
        let mut probe = MockConnectivityProbe::new();
        probe.expect_check_internet().times(1).returning(|| Ok(()));
        probe.expect_check_gateway().never();

        assert!(check_connectivity(&probe, Some("4.2.2.2")).await.is_ok());
    }

    #[tokio::test]
    async fn test_connectivity_failure_without_gateway_check() {
        let mut probe = MockConnectivityProbe::new();
        probe.expect_check_internet().times(1).returning(|| {
            Err(ProbeFailure::new(ProbeFailureKind::Timeout, "deadline elapsed"))
        });
        probe.expect_check_gateway().never();

        let err = check_connectivity(&probe, Some("4.2.2.2")).await.unwrap_err();
        assert!(matches!(err, EipAgentError::NoInternetConnection(_)));
    }

    #[tokio::test]
    async fn test_no_route_consults_gateway_then_fails() {
        let mut probe = MockConnectivityProbe::new();
        probe.expect_check_internet().times(1).returning(|| {
            Err(ProbeFailure::new(ProbeFailureKind::NoRouteToHost, "No route to host"))
        });
        probe
            .expect_check_gateway()
            .withf(|gw| gw == "4.2.2.2")
            .times(1)
            .returning(|_| Ok(()));

        let err = check_connectivity(&probe, Some("4.2.2.2")).await.unwrap_err();
        assert!(matches!(err, EipAgentError::NoInternetConnection(_)));
    }

    #[tokio::test]
    async fn test_no_route_with_dead_gateway_still_reports_internet() {
        let mut probe = MockConnectivityProbe::new();
        probe.expect_check_internet().times(1).returning(|| {
            Err(ProbeFailure::new(ProbeFailureKind::NoRouteToHost, "No route to host"))
        });
        probe
            .expect_check_gateway()
            .times(1)
            .returning(|gw| Err(EipAgentError::NoGatewayConnection(gw.to_string())));

        let err = check_connectivity(&probe, Some("4.2.2.2")).await.unwrap_err();
        assert!(matches!(err, EipAgentError::NoInternetConnection(_)));
    }

    #[tokio::test]
    async fn test_report_carries_gateway_result() {
        let mut probe = MockConnectivityProbe::new();
        probe.expect_check_internet().returning(|| {
            Err(ProbeFailure::new(ProbeFailureKind::NoRouteToHost, "No route to host"))
        });
        probe
            .expect_check_gateway()
            .times(1)
            .returning(|gw| Err(EipAgentError::NoGatewayConnection(gw.to_string())));

        let report = probe_connectivity(&probe, Some("4.2.2.2")).await;
        assert!(report.internet.is_err());
        assert!(matches!(report.gateway, Some(Err(EipAgentError::NoGatewayConnection(_)))));

        let mut probe = MockConnectivityProbe::new();
        probe.expect_check_internet().returning(|| {
            Err(ProbeFailure::new(ProbeFailureKind::Timeout, "deadline elapsed"))
        });
        probe.expect_check_gateway().never();
        assert!(probe_connectivity(&probe, Some("4.2.2.2")).await.gateway.is_none());
    }

    #[tokio::test]
    async fn test_no_route_without_gateway() {
        let mut probe = MockConnectivityProbe::new();
        probe.expect_check_internet().times(1).returning(|| {
            Err(ProbeFailure::new(ProbeFailureKind::NoRouteToHost, "No route to host"))
        });
        probe.expect_check_gateway().never();

        assert!(check_connectivity(&probe, None).await.is_err());
    }

    #[tokio::test]
    async fn test_system_probe_rejects_non_ip_gateway() {
        let probe = SystemProbe::new("http://127.0.0.1:9", Duration::from_secs(1), 1, 10.0).unwrap();
        let err = probe.check_gateway("-f").await.unwrap_err();
        assert!(matches!(err, EipAgentError::NoGatewayConnection(gw) if gw == "-f"));
    }

    #[tokio::test]
    async fn test_system_probe_refused_connection() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = SystemProbe::new(
            format!("http://127.0.0.1:{}/", port),
            Duration::from_secs(2),
            1,
            10.0,
        )
        .unwrap();
        let failure = probe.check_internet().await.unwrap_err();
        assert_ne!(failure.kind, ProbeFailureKind::HttpStatus);
    }
}
