//! Linux launcher
//!
//! The daemon is started through `pkexec`, drops to the invoking user, and
//! gets the DNS up/down script plus the down-root plugin when installed.
//! Standalone bundles ship their own shared libraries, so the library path
//! is pointed at the bundle.

use crate::config::ProviderConfig;
use crate::platform::{ElevationKind, LaunchPlatform, ManagementDefault};
use std::collections::BTreeMap;

/// Linux platform launcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinuxLauncher;

impl LaunchPlatform for LinuxLauncher {
    fn name(&self) -> &'static str {
        "linux"
    }

    fn daemon_binary_name(&self) -> &'static str {
        "openvpn"
    }

    fn elevation(&self) -> ElevationKind {
        ElevationKind::Pkexec
    }

    fn management_default(&self) -> ManagementDefault {
        ManagementDefault::UnixSocket
    }

    fn environment(&self, provider: &ProviderConfig) -> BTreeMap<String, String> {
        provider
            .bundled_lib_dir()
            .map(|lib| {
                BTreeMap::from([(
                    "LD_LIBRARY_PATH".to_string(),
                    lib.to_string_lossy().into_owned(),
                )])
            })
            .unwrap_or_default()
    }

    fn injects_up_down(&self) -> bool {
        true
    }
}
