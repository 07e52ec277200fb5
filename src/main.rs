//! eip-agent main entry point
//!
//! This binary launches the tunnel daemon for the configured provider and
//! supervises the session until it is interrupted.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use eip_agent::{
    config::{validate_ip_address, AgentConfig, EipConfig, EipServiceConfig},
    launcher::{LaunchPipeline, LaunchPlan},
    monitoring::{
        FileRouteSource, RouteTableInspector, SupervisionEvent, SupervisorConfig, SystemProbe,
        TunnelSupervisor, PROC_NET_ROUTE,
    },
    platform::PlatformLauncher,
    APP_NAME, VERSION,
};

/// Encrypted tunnel launch and supervision agent
#[derive(Parser, Debug)]
#[command(name = APP_NAME, version = VERSION, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(
        short,
        long,
        global = true,
        default_value = "/etc/eip-agent/config.toml"
    )]
    config: PathBuf,

    /// Launch for another platform (linux, darwin, windows)
    #[arg(long, global = true)]
    platform: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Launch the tunnel and supervise it until interrupted
    Connect,

    /// Print the command that would be launched
    Command,

    /// Check once whether the tunnel is the default route
    CheckRoute {
        /// Routing table snapshot to inspect
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Initialize structured logging with tracing
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Run the CLI command
async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Connect => {
            info!("Starting {} v{}", APP_NAME, VERSION);
            let config = AgentConfig::from_file(&cli.config)?;
            let plan = prepare(&config, cli.platform.as_deref())?;
            connect(&config, plan).await
        }
        Commands::Command => {
            let config = AgentConfig::from_file(&cli.config)?;
            let plan = prepare(&config, cli.platform.as_deref())?;
            println!("{}", plan.directive.command_line());
            Ok(())
        }
        Commands::CheckRoute { file } => {
            let path = file.unwrap_or_else(|| PathBuf::from(PROC_NET_ROUTE));
            let inspector = RouteTableInspector::new(Box::new(FileRouteSource::new(&path)));
            let route = inspector.check().await?;
            println!(
                "Tunnel {} is the default route (gateway {}, netmask {})",
                route.interface,
                route.gateway_addr(),
                route.netmask()
            );
            Ok(())
        }
        Commands::Version => {
            println!("{} v{}", APP_NAME, VERSION);
            Ok(())
        }
    }
}

/// Load provider configuration and run the launch pipeline
fn prepare(config: &AgentConfig, platform: Option<&str>) -> anyhow::Result<LaunchPlan> {
    let platform = match platform {
        Some(name) => name.parse::<PlatformLauncher>()?,
        None => PlatformLauncher::detect()?,
    };

    let eip = EipConfig::from_file(&config.provider.eip_config)?;
    let service = EipServiceConfig::from_file(&config.provider.eip_service_config)?;

    let plan = LaunchPipeline::new(platform)
        .on_step(|outcome| {
            if !outcome.passed {
                error!(
                    "{} failed: {}",
                    outcome.step,
                    outcome.error.as_deref().unwrap_or("unknown error")
                );
            }
        })
        .run(config, &eip, &service)?;

    info!(
        "Gateway {} ({}), management {}",
        plan.gateway.ip_address, plan.gateway.cluster_name, plan.management
    );
    Ok(plan)
}

/// Spawn the daemon and supervise it until shutdown or daemon exit
async fn connect(config: &AgentConfig, plan: LaunchPlan) -> anyhow::Result<()> {
    let mut child = plan.directive.spawn()?;

    let gateway = Some(plan.gateway.ip_address.clone())
        .filter(|gw| match validate_ip_address(gw) {
            Ok(()) => true,
            Err(e) => {
                warn!("Not pinging gateway: {}", e);
                false
            }
        });

    let probe = SystemProbe::from_config(&config.supervision)?;
    let mut supervisor = TunnelSupervisor::new(
        RouteTableInspector::system(),
        Arc::new(probe),
        SupervisorConfig::from_config(&config.supervision, gateway),
    );
    supervisor.add_observer(
        "log",
        Arc::new(|event: &SupervisionEvent| {
            if event.is_failure() {
                warn!("Tunnel degraded ({}): {}", event.kind, event.detail);
            } else {
                info!("Tunnel healthy again");
            }
        }),
    );
    supervisor.start()?;

    let exit = tokio::select! {
        _ = shutdown_signal() => None,
        status = child.wait() => Some(status),
    };

    supervisor.shutdown().await?;
    let status = supervisor.status();
    info!(
        "Supervision finished after {} poll(s), {} with failures",
        status.polls, status.failed_polls
    );

    match exit {
        Some(status) => {
            let status = status?;
            anyhow::ensure!(status.success(), "Tunnel daemon exited with {}", status);
            info!("Tunnel daemon exited");
        }
        None => {
            info!("Stopping tunnel daemon");
            if let Err(e) = child.kill().await {
                warn!("Failed to stop tunnel daemon: {}", e);
            }
        }
    }

    remove_management_dir(&plan);
    Ok(())
}

/// Remove the private directory holding a generated management socket
fn remove_management_dir(plan: &LaunchPlan) {
    if !plan.management.is_unix() {
        return;
    }
    let socket = Path::new(&plan.management.endpoint);
    if let Some(dir) = socket.parent() {
        let generated = dir
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("eip-agent-"));
        if generated {
            if let Err(e) = std::fs::remove_dir_all(dir) {
                warn!("Failed to remove {}: {}", dir.display(), e);
            }
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
