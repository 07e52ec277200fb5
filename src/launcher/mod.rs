//! Tunnel launch
//!
//! Turns validated provider configuration into a single process invocation
//! for the tunnel daemon. The launch path is synchronous and fail-fast:
//! every precondition is checked before anything is spawned.

mod command;
mod directive;
mod gateway;
mod options;
mod pipeline;

pub use command::build_args;
pub use directive::{shell_quote, ElevationWrapper, LaunchDirective};
pub use gateway::{resolve_gateway, CipherSuite, CIPHER_KEYS};
pub use options::{
    CertificatePaths, ManagementSocket, ManagementTransport, PrivilegeDrop, RemoteEndpoint,
    ScriptHooks, TunnelOptions, TunnelOptionsBuilder, MANAGEMENT_SOCKET_NAME,
    SCRIPT_SECURITY_LEVEL,
};
pub use pipeline::{LaunchPipeline, LaunchPlan, LaunchStep, StepOutcome};
