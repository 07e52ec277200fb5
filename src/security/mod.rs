//! Launch-time security checks
//!
//! Nothing is spawned until the key material is confirmed private and a
//! safe way to obtain privileges has been found:
//! - Key file presence and owner-only permissions
//! - Elevation mechanism and authentication agent detection

mod permissions;
mod privileges;

pub use permissions::{check_key_file, check_vpn_keys};
pub use privileges::{
    is_auth_agent_running, PrivilegeEscalationGuard, ProcFsTable, ProcessTable, OSASCRIPT_BIN,
    PKEXEC_BIN, POLKIT_AGENTS,
};

#[cfg(test)]
pub(crate) use privileges::MockProcessTable;
