//! Windows launcher
//!
//! The agent is expected to run elevated already. Windows has no unix
//! sockets for the management interface and no user/group drop.

use crate::config::ProviderConfig;
use crate::platform::{ElevationKind, LaunchPlatform, ManagementDefault};
use std::collections::BTreeMap;

/// Windows platform launcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowsLauncher;

impl LaunchPlatform for WindowsLauncher {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn daemon_binary_name(&self) -> &'static str {
        "openvpn.exe"
    }

    fn elevation(&self) -> ElevationKind {
        ElevationKind::None
    }

    fn management_default(&self) -> ManagementDefault {
        ManagementDefault::Tcp {
            host: "localhost".to_string(),
            port: 7777,
        }
    }

    fn environment(&self, _provider: &ProviderConfig) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    fn drops_privileges(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_contract() {
        assert_eq!(WindowsLauncher.daemon_binary_name(), "openvpn.exe");
        assert_eq!(WindowsLauncher.elevation(), ElevationKind::None);
        assert!(!WindowsLauncher.injects_up_down());
    }
}
