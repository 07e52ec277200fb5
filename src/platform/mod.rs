//! Platform-specific launch behavior
//!
//! Each supported OS differs in the daemon binary name, the way privileges
//! are obtained, the default management transport and the environment the
//! daemon needs. The launcher for the running OS is selected once, at
//! startup, from a closed set of variants.

use crate::config::ProviderConfig;
use crate::error::{EipAgentError, Result};
use crate::security::PrivilegeEscalationGuard;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

mod detection;
mod linux;
mod macos;
mod windows;

pub use detection::{current_group, current_user, find_executable, SearchPath};
pub use linux::LinuxLauncher;
pub use macos::DarwinLauncher;
pub use windows::WindowsLauncher;

/// How the daemon obtains root privileges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElevationKind {
    /// The agent already runs with enough privileges
    None,
    /// Prefix the command with `pkexec` (polkit)
    Pkexec,
    /// Run the command through an AppleScript administrator prompt
    AppleScript,
}

/// Management interface used when none is configured
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagementDefault {
    /// Unix socket in a fresh private directory
    UnixSocket,
    /// TCP endpoint
    Tcp {
        /// Listening host
        host: String,
        /// Listening port
        port: u16,
    },
}

/// Operations every platform launcher provides
pub trait LaunchPlatform {
    /// Short platform name for logs
    fn name(&self) -> &'static str;

    /// File name of the tunnel daemon
    fn daemon_binary_name(&self) -> &'static str;

    /// How privileges are obtained
    fn elevation(&self) -> ElevationKind;

    /// Management interface to use when the configuration has none
    fn management_default(&self) -> ManagementDefault;

    /// Environment overrides for the daemon process
    fn environment(&self, provider: &ProviderConfig) -> BTreeMap<String, String>;

    /// Daemon log file used when the configuration has none
    fn default_log_file(&self) -> Option<PathBuf> {
        None
    }

    /// Whether the daemon is told to drop to the invoking user and group
    fn drops_privileges(&self) -> bool {
        true
    }

    /// Whether DNS up/down scripts and the down-root plugin are injected
    fn injects_up_down(&self) -> bool {
        false
    }
}

/// Launcher for one of the supported platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformLauncher {
    /// Linux with polkit
    Linux(LinuxLauncher),
    /// macOS
    Darwin(DarwinLauncher),
    /// Windows
    Windows(WindowsLauncher),
}

impl PlatformLauncher {
    /// Launcher for the OS this binary runs on
    pub fn detect() -> Result<Self> {
        std::env::consts::OS.parse()
    }

    fn inner(&self) -> &dyn LaunchPlatform {
        match self {
            Self::Linux(l) => l,
            Self::Darwin(l) => l,
            Self::Windows(l) => l,
        }
    }

    /// Elevation guard for this platform
    pub fn guard(&self) -> PrivilegeEscalationGuard {
        PrivilegeEscalationGuard::new(self.elevation())
    }

    /// Directories searched for the daemon ahead of `PATH`
    pub fn bundled_dirs(&self, provider: &ProviderConfig) -> Vec<PathBuf> {
        provider.bundled_bin_dir().into_iter().collect()
    }
}

impl LaunchPlatform for PlatformLauncher {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn daemon_binary_name(&self) -> &'static str {
        self.inner().daemon_binary_name()
    }

    fn elevation(&self) -> ElevationKind {
        self.inner().elevation()
    }

    fn management_default(&self) -> ManagementDefault {
        self.inner().management_default()
    }

    fn environment(&self, provider: &ProviderConfig) -> BTreeMap<String, String> {
        self.inner().environment(provider)
    }

    fn default_log_file(&self) -> Option<PathBuf> {
        self.inner().default_log_file()
    }

    fn drops_privileges(&self) -> bool {
        self.inner().drops_privileges()
    }

    fn injects_up_down(&self) -> bool {
        self.inner().injects_up_down()
    }
}

impl FromStr for PlatformLauncher {
    type Err = EipAgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "linux" => Ok(Self::Linux(LinuxLauncher)),
            "macos" | "darwin" => Ok(Self::Darwin(DarwinLauncher)),
            "windows" => Ok(Self::Windows(WindowsLauncher)),
            other => Err(EipAgentError::Platform(format!(
                "Unsupported platform: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for PlatformLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
