//! Resolved tunnel options
//!
//! `TunnelOptions` holds every value the daemon invocation needs. It is only
//! produced by `TunnelOptionsBuilder::build`, which fails as a whole when a
//! required value is absent.

use super::gateway::CipherSuite;
use crate::config::{validate_verbosity, DeviceKind, Protocol};
use crate::error::{EipAgentError, Result};
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// Script security level needed for the up/down hooks
pub const SCRIPT_SECURITY_LEVEL: u8 = 2;

/// Socket file name inside the private management directory
pub const MANAGEMENT_SOCKET_NAME: &str = "openvpn.socket";

/// Remote gateway the daemon connects to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    /// Gateway address
    pub address: String,
    /// Gateway port
    pub port: u16,
    /// Transport protocol
    pub protocol: Protocol,
}

/// Transport of the daemon's management interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagementTransport {
    /// Unix socket; the endpoint is a file path
    Unix,
    /// TCP; the endpoint is a host
    Tcp(u16),
}

impl std::fmt::Display for ManagementTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unix => write!(f, "unix"),
            Self::Tcp(port) => write!(f, "{}", port),
        }
    }
}

/// Management interface descriptor, passed verbatim to `--management`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementSocket {
    /// Socket path or host
    pub endpoint: String,
    /// Transport tag
    pub transport: ManagementTransport,
}

impl ManagementSocket {
    /// Unix socket at `path`
    pub fn unix(path: impl AsRef<Path>) -> Self {
        Self {
            endpoint: path.as_ref().to_string_lossy().into_owned(),
            transport: ManagementTransport::Unix,
        }
    }

    /// TCP socket on `host:port`
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            endpoint: host.into(),
            transport: ManagementTransport::Tcp(port),
        }
    }

    /// Unix socket in a freshly created private directory under `base`
    #[cfg(unix)]
    pub fn fresh_unix(base: &Path) -> Result<Self> {
        let dir = create_private_dir(base)?;
        Ok(Self::unix(dir.join(MANAGEMENT_SOCKET_NAME)))
    }

    /// Whether this is a unix socket
    pub fn is_unix(&self) -> bool {
        self.transport == ManagementTransport::Unix
    }
}

impl std::fmt::Display for ManagementSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.endpoint, self.transport)
    }
}

#[cfg(unix)]
fn create_private_dir(base: &Path) -> Result<PathBuf> {
    use std::os::unix::fs::DirBuilderExt;
    use std::time::{SystemTime, UNIX_EPOCH};

    let pid = std::process::id();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();

    for attempt in 0..16u32 {
        let dir = base.join(format!("eip-agent-{}-{:08x}{:x}", pid, nanos, attempt));
        match std::fs::DirBuilder::new().mode(0o700).create(&dir) {
            Ok(()) => return Ok(dir),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(EipAgentError::Platform(format!(
                    "Failed to create management directory in {}: {}",
                    base.display(),
                    e
                )))
            }
        }
    }

    Err(EipAgentError::Platform(format!(
        "Could not find a free management directory name in {}",
        base.display()
    )))
}

/// User and group the daemon drops to after setup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegeDrop {
    /// User name
    pub user: String,
    /// Group name
    pub group: String,
}

/// DNS up/down script and the plugin that runs the down script as root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptHooks {
    /// Script run on up and down
    pub up_down_script: PathBuf,
    /// Down-root plugin
    pub plugin: PathBuf,
}

impl ScriptHooks {
    /// Hooks for `script`, or `None` if the script is not installed
    pub fn detect(script: &Path, plugin: &Path) -> Option<Self> {
        if script.is_file() {
            Some(Self {
                up_down_script: script.to_path_buf(),
                plugin: plugin.to_path_buf(),
            })
        } else {
            error!(
                "Could not find up/down script {}. Might produce DNS leaks.",
                script.display()
            );
            None
        }
    }
}

/// Certificate and key files handed to the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePaths {
    /// Client certificate
    pub client_cert: PathBuf,
    /// Client key
    pub client_key: PathBuf,
    /// CA certificate
    pub ca_cert: PathBuf,
}

/// Fully resolved daemon parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelOptions {
    /// Virtual device kind
    pub device: DeviceKind,
    /// Keep the device across restarts
    pub persist_tun: bool,
    /// Keep keys across restarts
    pub persist_key: bool,
    /// Daemon log verbosity
    pub verbosity: Option<u8>,
    /// Gateway endpoint
    pub remote: RemoteEndpoint,
    /// Cipher options
    pub ciphers: CipherSuite,
    /// Privilege drop target; `None` where unsupported
    pub privilege_drop: Option<PrivilegeDrop>,
    /// Management interface
    pub management: ManagementSocket,
    /// `--script-security` level
    pub script_security: u8,
    /// DNS hooks, when installed
    pub scripts: Option<ScriptHooks>,
    /// Certificate paths
    pub certificates: CertificatePaths,
    /// Daemon log file
    pub log_file: Option<PathBuf>,
}

impl TunnelOptions {
    /// Start building options
    pub fn builder() -> TunnelOptionsBuilder {
        TunnelOptionsBuilder::default()
    }

    /// Check that every required value is present
    pub fn validate(&self) -> Result<()> {
        require(!self.remote.address.trim().is_empty(), "remote address")?;
        require(!self.management.endpoint.is_empty(), "management endpoint")?;
        require(!is_blank(&self.certificates.client_cert), "client certificate")?;
        require(!is_blank(&self.certificates.client_key), "client key")?;
        require(!is_blank(&self.certificates.ca_cert), "CA certificate")?;
        if let Some(drop) = &self.privilege_drop {
            require(!drop.user.is_empty(), "user")?;
            require(!drop.group.is_empty(), "group")?;
        }
        Ok(())
    }
}

fn is_blank(path: &Path) -> bool {
    path.as_os_str().is_empty()
}

fn require(present: bool, field: &str) -> Result<()> {
    if present {
        Ok(())
    } else {
        Err(EipAgentError::IncompleteTunnelOptions(field.to_string()))
    }
}

/// Builder for `TunnelOptions`
#[derive(Debug, Clone, Default)]
pub struct TunnelOptionsBuilder {
    device: DeviceKind,
    verbosity: Option<u8>,
    remote: Option<RemoteEndpoint>,
    ciphers: CipherSuite,
    privilege_drop: Option<PrivilegeDrop>,
    management: Option<ManagementSocket>,
    scripts: Option<ScriptHooks>,
    certificates: Option<CertificatePaths>,
    log_file: Option<PathBuf>,
}

impl TunnelOptionsBuilder {
    /// Virtual device kind
    pub fn device(mut self, device: DeviceKind) -> Self {
        self.device = device;
        self
    }

    /// Daemon verbosity; out-of-range levels are ignored
    pub fn verbosity(mut self, verbosity: Option<u8>) -> Self {
        self.verbosity = verbosity.filter(|level| match validate_verbosity(*level) {
            Ok(()) => true,
            Err(e) => {
                warn!("Ignoring daemon verbosity: {}", e);
                false
            }
        });
        self
    }

    /// Gateway endpoint
    pub fn remote(mut self, address: impl Into<String>, port: u16, protocol: Protocol) -> Self {
        self.remote = Some(RemoteEndpoint {
            address: address.into(),
            port,
            protocol,
        });
        self
    }

    /// Cipher options
    pub fn ciphers(mut self, ciphers: CipherSuite) -> Self {
        self.ciphers = ciphers;
        self
    }

    /// Drop to `user`/`group` after setup
    pub fn privilege_drop(mut self, user: impl Into<String>, group: impl Into<String>) -> Self {
        self.privilege_drop = Some(PrivilegeDrop {
            user: user.into(),
            group: group.into(),
        });
        self
    }

    /// Management interface
    pub fn management(mut self, management: ManagementSocket) -> Self {
        self.management = Some(management);
        self
    }

    /// DNS hooks
    pub fn scripts(mut self, scripts: Option<ScriptHooks>) -> Self {
        self.scripts = scripts;
        self
    }

    /// Certificate paths
    pub fn certificates(
        mut self,
        client_cert: impl Into<PathBuf>,
        client_key: impl Into<PathBuf>,
        ca_cert: impl Into<PathBuf>,
    ) -> Self {
        self.certificates = Some(CertificatePaths {
            client_cert: client_cert.into(),
            client_key: client_key.into(),
            ca_cert: ca_cert.into(),
        });
        self
    }

    /// Daemon log file
    pub fn log_file(mut self, log_file: Option<PathBuf>) -> Self {
        self.log_file = log_file;
        self
    }

    /// Build the options, failing if anything required is missing
    pub fn build(self) -> Result<TunnelOptions> {
        let options = TunnelOptions {
            device: self.device,
            persist_tun: true,
            persist_key: true,
            verbosity: self.verbosity,
            remote: self
                .remote
                .ok_or_else(|| EipAgentError::IncompleteTunnelOptions("remote".to_string()))?,
            ciphers: self.ciphers,
            privilege_drop: self.privilege_drop,
            management: self.management.ok_or_else(|| {
                EipAgentError::IncompleteTunnelOptions("management socket".to_string())
            })?,
            script_security: SCRIPT_SECURITY_LEVEL,
            scripts: self.scripts,
            certificates: self.certificates.ok_or_else(|| {
                EipAgentError::IncompleteTunnelOptions("certificates".to_string())
            })?,
            log_file: self.log_file,
        };

        options.validate()?;
        Ok(options)
    }
}
