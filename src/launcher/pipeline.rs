//! Launch pipeline
//!
//! One connection attempt runs these steps in order and stops at the first
//! failure, before any process exists:
//!
//! 1. `ResolveGateway`: gateway and cipher options from provider config
//! 2. `CheckKeys`: certificate and key files exist and are private
//! 3. `BuildOptions`: assemble `TunnelOptions`
//! 4. `VerifyElevation`: elevation binary and authentication agent
//! 5. `ResolveDaemon`: locate the daemon, bundled copy first
//! 6. `BuildDirective`: arguments, environment and wrapper
//!
//! Each step's outcome is reported to an optional callback.

use super::command::build_args;
use super::directive::LaunchDirective;
use super::gateway::{resolve_gateway, CipherSuite};
use super::options::{ManagementSocket, ScriptHooks, TunnelOptions};
use crate::config::{AgentConfig, EipConfig, EipServiceConfig, GatewayDescriptor};
use crate::error::{EipAgentError, Result};
use crate::platform::{
    current_group, current_user, LaunchPlatform, ManagementDefault, PlatformLauncher, SearchPath,
};
use crate::security::{check_vpn_keys, ProcFsTable, ProcessTable};
use tracing::{debug, info, warn};

/// Step of the launch pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaunchStep {
    /// Pick the gateway and cipher options
    ResolveGateway,
    /// Check certificate and key files
    CheckKeys,
    /// Assemble tunnel options
    BuildOptions,
    /// Check privilege escalation preconditions
    VerifyElevation,
    /// Locate the daemon binary
    ResolveDaemon,
    /// Produce the launch directive
    BuildDirective,
}

impl LaunchStep {
    /// Every step, in execution order
    pub const ALL: [LaunchStep; 6] = [
        Self::ResolveGateway,
        Self::CheckKeys,
        Self::BuildOptions,
        Self::VerifyElevation,
        Self::ResolveDaemon,
        Self::BuildDirective,
    ];
}

impl std::fmt::Display for LaunchStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResolveGateway => write!(f, "resolve_gateway"),
            Self::CheckKeys => write!(f, "check_keys"),
            Self::BuildOptions => write!(f, "build_options"),
            Self::VerifyElevation => write!(f, "verify_elevation"),
            Self::ResolveDaemon => write!(f, "resolve_daemon"),
            Self::BuildDirective => write!(f, "build_directive"),
        }
    }
}

/// Result of one pipeline step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// Step that ran
    pub step: LaunchStep,
    /// Whether it succeeded
    pub passed: bool,
    /// Error message on failure
    pub error: Option<String>,
}

/// Everything a successful pipeline run produces
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    /// Selected gateway
    pub gateway: GatewayDescriptor,
    /// Management interface the daemon will expose
    pub management: ManagementSocket,
    /// Resolved tunnel options
    pub options: TunnelOptions,
    /// Process to launch
    pub directive: LaunchDirective,
}

type StepCallback = Box<dyn Fn(&StepOutcome) + Send + Sync>;

/// Runs the launch steps for one platform
pub struct LaunchPipeline {
    platform: PlatformLauncher,
    search: SearchPath,
    processes: Box<dyn ProcessTable>,
    on_step: Option<StepCallback>,
}

impl LaunchPipeline {
    /// Pipeline using `PATH` and the system process table
    pub fn new(platform: PlatformLauncher) -> Self {
        Self {
            platform,
            search: SearchPath::from_env(),
            processes: Box::new(ProcFsTable::default()),
            on_step: None,
        }
    }

    /// Replace the executable search path (bundled dirs are still prepended)
    pub fn with_search_path(mut self, search: SearchPath) -> Self {
        self.search = search;
        self
    }

    /// Replace the process table used for agent detection
    pub fn with_process_table(mut self, processes: Box<dyn ProcessTable>) -> Self {
        self.processes = processes;
        self
    }

    /// Report every step outcome to `callback`
    pub fn on_step<F>(mut self, callback: F) -> Self
    where
        F: Fn(&StepOutcome) + Send + Sync + 'static,
    {
        self.on_step = Some(Box::new(callback));
        self
    }

    /// Platform this pipeline launches for
    pub fn platform(&self) -> PlatformLauncher {
        self.platform
    }

    /// Run every step and return the plan
    pub fn run(
        &self,
        config: &AgentConfig,
        eip: &EipConfig,
        service: &EipServiceConfig,
    ) -> Result<LaunchPlan> {
        info!("Preparing tunnel launch for {}", self.platform);

        let (gateway, ciphers) = self.step(LaunchStep::ResolveGateway, || {
            let gateway = resolve_gateway(
                eip,
                service,
                config.compat.gateway_placeholder.as_deref(),
            )?;
            let ciphers = CipherSuite::from_openvpn_configuration(&service.openvpn_configuration);
            Ok((gateway, ciphers))
        })?;

        let provider = &config.provider;
        self.step(LaunchStep::CheckKeys, || {
            check_vpn_keys(&provider.ca_cert, &provider.client_cert, provider.client_key())
        })?;

        let options = self.step(LaunchStep::BuildOptions, || {
            self.build_options(config, &gateway, ciphers)
        })?;

        let elevation = self.step(LaunchStep::VerifyElevation, || {
            self.platform
                .guard()
                .verify(&self.search, self.processes.as_ref())
        })?;

        let daemon = self.step(LaunchStep::ResolveDaemon, || {
            let name = self.platform.daemon_binary_name();
            self.search
                .clone()
                .with_bundled(self.platform.bundled_dirs(provider))
                .find(name)
                .ok_or_else(|| EipAgentError::TunnelBinaryNotFound(name.to_string()))
        })?;

        let directive = self.step(LaunchStep::BuildDirective, || {
            let args = build_args(&options)?;
            let env = self.platform.environment(provider);
            Ok(LaunchDirective::new(daemon, args, env, elevation))
        })?;

        debug!("Running VPN with command: {}", directive.command_line());
        Ok(LaunchPlan {
            gateway,
            management: options.management.clone(),
            options,
            directive,
        })
    }

    fn build_options(
        &self,
        config: &AgentConfig,
        gateway: &GatewayDescriptor,
        ciphers: CipherSuite,
    ) -> Result<TunnelOptions> {
        let tunnel = &config.tunnel;
        let provider = &config.provider;

        let mut builder = TunnelOptions::builder()
            .device(tunnel.device)
            .verbosity(tunnel.verbosity)
            .remote(gateway.ip_address.clone(), tunnel.port, tunnel.protocol)
            .ciphers(ciphers)
            .management(self.management_socket(config)?)
            .certificates(
                provider.client_cert.clone(),
                provider.client_key().clone(),
                provider.ca_cert.clone(),
            )
            .log_file(
                tunnel
                    .log_file
                    .clone()
                    .or_else(|| self.platform.default_log_file()),
            );

        if self.platform.drops_privileges() {
            let user = match &tunnel.user {
                Some(user) => user.clone(),
                None => current_user()?,
            };
            let group = match &tunnel.group {
                Some(group) => group.clone(),
                None => current_group()?,
            };
            builder = builder.privilege_drop(user, group);
        }

        if self.platform.injects_up_down() {
            builder = builder.scripts(ScriptHooks::detect(
                &tunnel.up_down_script,
                &tunnel.down_root_plugin,
            ));
        }

        builder.build()
    }

    fn management_socket(&self, config: &AgentConfig) -> Result<ManagementSocket> {
        let management = &config.management;
        if let Some(path) = &management.socket_path {
            return Ok(ManagementSocket::unix(path));
        }
        if let (Some(host), Some(port)) = (&management.host, management.port) {
            return Ok(ManagementSocket::tcp(host.clone(), port));
        }

        match self.platform.management_default() {
            ManagementDefault::Tcp { host, port } => Ok(ManagementSocket::tcp(host, port)),
            ManagementDefault::UnixSocket => fresh_unix_socket(),
        }
    }

    fn step<T>(&self, step: LaunchStep, run: impl FnOnce() -> Result<T>) -> Result<T> {
        let result = run();

        let outcome = match &result {
            Ok(_) => {
                debug!("Launch step {} passed", step);
                StepOutcome {
                    step,
                    passed: true,
                    error: None,
                }
            }
            Err(e) => {
                warn!("Launch step {} failed: {}", step, e);
                StepOutcome {
                    step,
                    passed: false,
                    error: Some(e.to_string()),
                }
            }
        };

        if let Some(callback) = &self.on_step {
            callback(&outcome);
        }
        result
    }
}

#[cfg(unix)]
fn fresh_unix_socket() -> Result<ManagementSocket> {
    ManagementSocket::fresh_unix(&std::env::temp_dir())
}

#[cfg(not(unix))]
fn fresh_unix_socket() -> Result<ManagementSocket> {
    Err(EipAgentError::Platform(
        "Unix management sockets are not supported on this platform".to_string(),
    ))
}
