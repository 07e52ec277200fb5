//! macOS launcher
//!
//! There is no polkit on macOS. The whole command line is run through an
//! AppleScript `do shell script ... with administrator privileges` prompt,
//! and the daemon logs to a file since its output is not captured.

use crate::config::ProviderConfig;
use crate::platform::{ElevationKind, LaunchPlatform, ManagementDefault};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Daemon log file when none is configured
pub const DEFAULT_LOG_FILE: &str = "/tmp/leap_openvpn.log";

/// macOS platform launcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DarwinLauncher;

impl LaunchPlatform for DarwinLauncher {
    fn name(&self) -> &'static str {
        "darwin"
    }

    fn daemon_binary_name(&self) -> &'static str {
        "openvpn.leap"
    }

    fn elevation(&self) -> ElevationKind {
        ElevationKind::AppleScript
    }

    fn management_default(&self) -> ManagementDefault {
        ManagementDefault::UnixSocket
    }

    fn environment(&self, _provider: &ProviderConfig) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    fn default_log_file(&self) -> Option<PathBuf> {
        Some(PathBuf::from(DEFAULT_LOG_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_darwin_contract() {
        assert_eq!(DarwinLauncher.daemon_binary_name(), "openvpn.leap");
        assert_eq!(
            DarwinLauncher.default_log_file(),
            Some(PathBuf::from("/tmp/leap_openvpn.log"))
        );
        assert!(DarwinLauncher.drops_privileges());
        assert!(!DarwinLauncher.injects_up_down());
    }
}
