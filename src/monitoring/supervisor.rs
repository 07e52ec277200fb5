//! Background tunnel supervision
//!
//! The supervisor runs as its own task through three states:
//!
//! - `AwaitingFirstUp`: checks the routing table on a short retry policy,
//!   silently, until the tunnel is the default route once.
//! - `Supervising`: every interval, checks the routing table, the internet
//!   and (optionally) the gateway. Failures become events for observers; a
//!   return to all-passing after a failure emits one `Recovered` event.
//! - `Stopped`: the shutdown signal was seen at a poll boundary. The signal
//!   is cleared on exit so the supervisor can be started again.

use super::observer::{Observer, ObserverSet};
use super::probe::{probe_connectivity, ConnectivityProbe};
use super::routes::RouteTableInspector;
use super::{ConnectivityState, SupervisionEvent, SupervisionEventKind};
use crate::config::SupervisionConfig;
use crate::error::{EipAgentError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Retry policy while waiting for the tunnel to come up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between attempts
    pub interval: Duration,
    /// Attempt ceiling; unbounded when `None`
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Unbounded policy with the given delay
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }

    /// Limit the number of attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Whether another attempt may follow `attempts` failed ones
    pub fn allows_retry(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }
}

/// Supervisor settings
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Delay between supervision polls
    pub interval: Duration,
    /// Policy while waiting for the first tunnel-up
    pub startup: RetryPolicy,
    /// Gateway to ping each poll
    pub gateway: Option<String>,
}

impl SupervisorConfig {
    /// Build from the agent's supervision settings
    pub fn from_config(config: &SupervisionConfig, gateway: Option<String>) -> Self {
        let mut startup = RetryPolicy::new(Duration::from_secs(config.startup_retry_secs));
        if let Some(max) = config.startup_max_attempts {
            startup = startup.with_max_attempts(max);
        }

        Self {
            interval: Duration::from_secs(config.interval_secs),
            startup,
            gateway: gateway.filter(|_| config.ping_gateway),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::from_config(&SupervisionConfig::default(), None)
    }
}

/// Cooperative shutdown flag, checked at poll boundaries
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    /// Create a lowered signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to exit at its next boundary
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether shutdown was requested
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Lower the signal
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Supervisor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Never started
    Idle,
    /// Waiting for the tunnel to become the default route
    AwaitingFirstUp,
    /// Polling and reporting
    Supervising,
    /// Loop exited
    Stopped,
}

impl std::fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::AwaitingFirstUp => write!(f, "awaiting_first_up"),
            Self::Supervising => write!(f, "supervising"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Snapshot of the supervisor for display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorStatus {
    /// Lifecycle state
    pub state: SupervisorState,
    /// Latest internet connectivity
    pub connectivity: ConnectivityState,
    /// Completed supervision polls in the current run
    pub polls: u64,
    /// Polls with at least one failed check in the current run
    pub failed_polls: u64,
}

impl SupervisorStatus {
    fn idle() -> Self {
        Self {
            state: SupervisorState::Idle,
            connectivity: ConnectivityState::unknown(),
            polls: 0,
            failed_polls: 0,
        }
    }
}

type SharedStatus = Arc<RwLock<SupervisorStatus>>;

fn update_status(status: &SharedStatus, f: impl FnOnce(&mut SupervisorStatus)) {
    match status.write() {
        Ok(mut guard) => f(&mut guard),
        Err(poisoned) => f(&mut poisoned.into_inner()),
    }
}

/// Supervises an established tunnel session
pub struct TunnelSupervisor {
    inspector: Arc<RouteTableInspector>,
    probe: Arc<dyn ConnectivityProbe>,
    config: SupervisorConfig,
    observers: Vec<(String, Arc<dyn Observer>)>,
    shutdown: ShutdownSignal,
    status: SharedStatus,
    handle: Option<JoinHandle<()>>,
}

impl TunnelSupervisor {
    /// Create a supervisor
    pub fn new(
        inspector: RouteTableInspector,
        probe: Arc<dyn ConnectivityProbe>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            inspector: Arc::new(inspector),
            probe,
            config,
            observers: Vec::new(),
            shutdown: ShutdownSignal::new(),
            status: Arc::new(RwLock::new(SupervisorStatus::idle())),
            handle: None,
        }
    }

    /// Register an observer; takes effect from the next start
    pub fn add_observer(&mut self, name: impl Into<String>, observer: Arc<dyn Observer>) {
        self.observers.push((name.into(), observer));
    }

    /// Handle for raising shutdown from elsewhere
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Current status snapshot
    pub fn status(&self) -> SupervisorStatus {
        match self.status.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Whether the poll loop is running
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn the poll loop on the current tokio runtime
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(EipAgentError::InvalidState(
                "Supervisor is already running".to_string(),
            ));
        }

        let mut observers = ObserverSet::new();
        for (name, observer) in &self.observers {
            observers.register(name.clone(), observer.clone())?;
        }

        // A stop requested while nothing was running must not end the new loop
        self.shutdown.reset();
        update_status(&self.status, |s| {
            *s = SupervisorStatus::idle();
            s.state = SupervisorState::AwaitingFirstUp;
        });

        let poll_loop = PollLoop {
            inspector: self.inspector.clone(),
            probe: self.probe.clone(),
            config: self.config.clone(),
            observers,
            shutdown: self.shutdown.clone(),
            status: self.status.clone(),
        };

        info!(
            "Starting tunnel supervision (interval {:?}, {} observer(s))",
            self.config.interval,
            poll_loop.observers.len()
        );
        self.handle = Some(tokio::spawn(poll_loop.run()));
        Ok(())
    }

    /// Request shutdown; the loop exits at its next poll boundary
    pub fn stop(&self) {
        if self.is_running() {
            debug!("Tunnel supervision shutdown requested");
            self.shutdown.raise();
        }
    }

    /// Wait for the poll loop to exit
    pub async fn wait(&mut self) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            handle.await.map_err(|e| {
                EipAgentError::InvalidState(format!("Supervisor task failed: {}", e))
            })?;
        }
        Ok(())
    }

    /// Request shutdown and wait for the loop to exit
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stop();
        self.wait().await
    }
}

impl Drop for TunnelSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

struct PollLoop {
    inspector: Arc<RouteTableInspector>,
    probe: Arc<dyn ConnectivityProbe>,
    config: SupervisorConfig,
    observers: ObserverSet,
    shutdown: ShutdownSignal,
    status: SharedStatus,
}

struct PollOutcome {
    internet_up: bool,
    events: Vec<SupervisionEvent>,
}

impl PollLoop {
    async fn run(self) {
        if self.await_first_up().await {
            self.supervise().await;
        }

        self.shutdown.reset();
        update_status(&self.status, |s| s.state = SupervisorState::Stopped);
        info!("Tunnel supervision stopped");
    }

    /// Returns false when shutdown was requested before the tunnel came up
    async fn await_first_up(&self) -> bool {
        let policy = self.config.startup;
        let mut attempts = 0u32;

        loop {
            if self.shutdown.is_raised() {
                return false;
            }

            attempts += 1;
            match self.inspector.check().await {
                Ok(route) => {
                    info!("Tunnel {} is the default route", route.interface);
                    return true;
                }
                Err(e) => {
                    debug!("Waiting for tunnel (attempt {}): {}", attempts, e);
                    if !policy.allows_retry(attempts) {
                        warn!(
                            "Tunnel not up after {} attempts, supervising anyway",
                            attempts
                        );
                        return true;
                    }
                }
            }

            sleep(policy.interval).await;
        }
    }

    async fn supervise(&self) {
        update_status(&self.status, |s| s.state = SupervisorState::Supervising);
        let mut degraded = false;

        while !self.shutdown.is_raised() {
            let outcome = self.poll_once().await;
            let failed = !outcome.events.is_empty();

            update_status(&self.status, |s| {
                s.polls += 1;
                if failed {
                    s.failed_polls += 1;
                }
                s.connectivity.record(outcome.internet_up);
            });

            if failed {
                degraded = true;
                for event in &outcome.events {
                    warn!("Tunnel check failed ({}): {}", event.kind, event.detail);
                    self.observers.dispatch(event);
                }
            } else if degraded {
                degraded = false;
                info!("All tunnel checks passing again");
                self.observers.dispatch(&SupervisionEvent::new(
                    SupervisionEventKind::Recovered,
                    "all checks passing",
                ));
            }

            sleep(self.config.interval).await;
        }
    }

    async fn poll_once(&self) -> PollOutcome {
        let mut events = Vec::new();
        let gateway = self.config.gateway.as_deref();

        if let Err(e) = self.inspector.check().await {
            events.push(SupervisionEvent::new(
                SupervisionEventKind::TunnelNotDefaultRoute,
                e.to_string(),
            ));
        }

        let report = probe_connectivity(self.probe.as_ref(), gateway).await;
        let internet_up = report.internet.is_ok();
        if let Err(e) = report.internet {
            let kind = e
                .supervision_kind()
                .unwrap_or(SupervisionEventKind::NoInternetConnection);
            events.push(SupervisionEvent::new(kind, e.to_string()));
        }

        if let Some(gateway) = gateway {
            let result = match report.gateway {
                Some(result) => result,
                None => self.probe.check_gateway(gateway).await,
            };
            if let Err(e) = result {
                events.push(SupervisionEvent::new(
                    SupervisionEventKind::NoGatewayConnection,
                    e.to_string(),
                ));
            }
        }

        PollOutcome {
            internet_up,
            events,
        }
    }
}
