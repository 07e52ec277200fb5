//! Privilege escalation preconditions
//!
//! The daemon needs root to create the tunnel device. On Linux that is
//! requested through polkit's `pkexec`, which is only safe to use when a
//! graphical authentication agent is running; without one pkexec falls back
//! to a text prompt the user never sees. On macOS the request goes through
//! an AppleScript administrator prompt.

use crate::error::{EipAgentError, Result};
use crate::launcher::ElevationWrapper;
use crate::platform::{ElevationKind, SearchPath};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// polkit elevation binary
pub const PKEXEC_BIN: &str = "pkexec";

/// AppleScript runner
pub const OSASCRIPT_BIN: &str = "osascript";

/// Known graphical polkit authentication agents
pub const POLKIT_AGENTS: &[&str] = &[
    "polkit-gnome-authentication-agent-1",
    "polkit-kde-authentication-agent-1",
    "polkit-mate-authentication-agent-1",
    "lxpolkit",
    "lxqt-policykit-agent",
    "xfce-polkit",
];

/// Listing of running processes
#[cfg_attr(test, mockall::automock)]
pub trait ProcessTable: Send + Sync {
    /// Command line of every visible process, arguments joined by spaces
    fn command_lines(&self) -> Result<Vec<String>>;
}

/// Process table read from procfs
#[derive(Debug, Clone)]
pub struct ProcFsTable {
    root: PathBuf,
}

impl ProcFsTable {
    /// Read processes below `root` (normally `/proc`)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for ProcFsTable {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcessTable for ProcFsTable {
    fn command_lines(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| {
            EipAgentError::Platform(format!(
                "Failed to list processes in {}: {}",
                self.root.display(),
                e
            ))
        })?;

        let mut lines = Vec::new();
        for entry in entries.flatten() {
            let is_pid = entry
                .file_name()
                .to_str()
                .is_some_and(|name| !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()));
            if !is_pid {
                continue;
            }

            // Processes may exit between listing and reading
            let Ok(raw) = std::fs::read(entry.path().join("cmdline")) else {
                continue;
            };
            let line = raw
                .split(|b| *b == 0)
                .filter(|arg| !arg.is_empty())
                .map(|arg| String::from_utf8_lossy(arg).into_owned())
                .collect::<Vec<_>>()
                .join(" ");
            if !line.is_empty() {
                lines.push(line);
            }
        }

        Ok(lines)
    }
}

/// Whether a known polkit authentication agent is running
pub fn is_auth_agent_running(processes: &dyn ProcessTable) -> Result<bool> {
    let running = processes.command_lines()?.iter().any(|line| {
        line.split_whitespace()
            .next()
            .and_then(|argv0| Path::new(argv0).file_name())
            .and_then(|name| name.to_str())
            .is_some_and(|name| POLKIT_AGENTS.contains(&name))
    });
    Ok(running)
}

/// Verifies that privileges can be requested safely before launching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivilegeEscalationGuard {
    kind: ElevationKind,
}

impl PrivilegeEscalationGuard {
    /// Guard for the given elevation mechanism
    pub fn new(kind: ElevationKind) -> Self {
        Self { kind }
    }

    /// Elevation mechanism this guard checks
    pub fn kind(&self) -> ElevationKind {
        self.kind
    }

    /// Check the preconditions and return the wrapper to launch through
    pub fn verify(
        &self,
        search: &SearchPath,
        processes: &dyn ProcessTable,
    ) -> Result<Option<ElevationWrapper>> {
        match self.kind {
            ElevationKind::None => {
                debug!("No privilege escalation needed on this platform");
                Ok(None)
            }
            ElevationKind::Pkexec => {
                let pkexec = search.find(PKEXEC_BIN).ok_or_else(|| {
                    warn!("System has no pkexec");
                    EipAgentError::ElevationMechanismNotFound(PKEXEC_BIN.to_string())
                })?;

                if !is_auth_agent_running(processes)? {
                    warn!("No polkit authentication agent found, refusing to use pkexec's own agent");
                    return Err(EipAgentError::NoAuthenticationAgentAvailable);
                }

                info!("Using {} for privilege escalation", pkexec.display());
                Ok(Some(ElevationWrapper::Pkexec(pkexec)))
            }
            ElevationKind::AppleScript => {
                let osascript = search.find(OSASCRIPT_BIN).ok_or_else(|| {
                    EipAgentError::ElevationMechanismNotFound(OSASCRIPT_BIN.to_string())
                })?;
                Ok(Some(ElevationWrapper::AppleScript(osascript)))
            }
        }
    }
}
