//! Launch directive
//!
//! The directive is exactly what gets executed: the program, its arguments
//! and the environment overrides, with any elevation wrapper already
//! applied.

use crate::error::{EipAgentError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::process::{Child, Command};
use tracing::{debug, info};

/// How the daemon command is wrapped to obtain privileges
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElevationWrapper {
    /// `pkexec <daemon> <args>`
    Pkexec(PathBuf),
    /// `osascript -e 'do shell script "<command>" with administrator privileges'`
    AppleScript(PathBuf),
}

impl ElevationWrapper {
    /// Path of the wrapping binary
    pub fn binary(&self) -> &Path {
        match self {
            Self::Pkexec(path) | Self::AppleScript(path) => path,
        }
    }

    /// Program and arguments that run `daemon args` through this wrapper
    pub fn wrap(&self, daemon: &Path, args: &[String]) -> (PathBuf, Vec<String>) {
        match self {
            Self::Pkexec(pkexec) => {
                let mut argv = Vec::with_capacity(args.len() + 1);
                argv.push(daemon.to_string_lossy().into_owned());
                argv.extend(args.iter().cloned());
                (pkexec.clone(), argv)
            }
            Self::AppleScript(osascript) => {
                let command = shell_join(daemon, args);
                let script = format!(
                    "do shell script \"{}\" with administrator privileges",
                    command.replace('\\', "\\\\").replace('"', "\\\"")
                );
                (osascript.clone(), vec!["-e".to_string(), script])
            }
        }
    }
}

/// Process invocation for one connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchDirective {
    daemon: PathBuf,
    executable: PathBuf,
    argv: Vec<String>,
    env: BTreeMap<String, String>,
    elevation: Option<ElevationWrapper>,
}

impl LaunchDirective {
    /// Combine the daemon invocation with an optional elevation wrapper
    pub fn new(
        daemon: PathBuf,
        args: Vec<String>,
        env: BTreeMap<String, String>,
        elevation: Option<ElevationWrapper>,
    ) -> Self {
        let (executable, argv) = match &elevation {
            Some(wrapper) => wrapper.wrap(&daemon, &args),
            None => (daemon.clone(), args),
        };

        Self {
            daemon,
            executable,
            argv,
            env,
            elevation,
        }
    }

    /// Program that is executed
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Arguments passed to the program
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Environment overrides
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Elevation wrapper, if any
    pub fn elevation(&self) -> Option<&ElevationWrapper> {
        self.elevation.as_ref()
    }

    /// Resolved daemon binary
    pub fn daemon(&self) -> &Path {
        &self.daemon
    }

    /// Shell-quoted command line for display
    pub fn command_line(&self) -> String {
        let mut line: Vec<String> = self
            .env
            .iter()
            .map(|(key, value)| format!("{}={}", key, shell_quote(value)))
            .collect();
        line.push(shell_join(&self.executable, &self.argv));
        line.join(" ")
    }

    /// Command ready to spawn
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.executable);
        command.args(&self.argv).envs(&self.env);
        command
    }

    /// Start the process
    ///
    /// The returned child is owned by the caller; dropping it does not stop
    /// the daemon.
    pub fn spawn(&self) -> Result<Child> {
        info!("Launching {}", self.executable.display());
        debug!("Command line: {}", self.command_line());

        self.to_command().spawn().map_err(|e| {
            EipAgentError::Platform(format!(
                "Failed to launch {}: {}",
                self.executable.display(),
                e
            ))
        })
    }
}

fn shell_join(program: &Path, args: &[String]) -> String {
    std::iter::once(shell_quote(&program.to_string_lossy()))
        .chain(args.iter().map(|arg| shell_quote(arg)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Quote `arg` for a POSIX shell when needed
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}
