//! l2tpctl - L2TP/IPsec VPN connection library
//!
//! Brings up an L2TP-over-IPsec tunnel on a disposable host (typically a CI
//! runner) and routes traffic through it:
//! - Package installation (strongSwan, xl2tpd, ppp)
//! - Configuration generation and protected writes
//! - Daemon startup
//! - Readiness polling
//! - Routing and resolver switch-over

pub mod error;
pub mod validation;
pub mod config;
pub mod command;
pub mod install;
pub mod routing;
pub mod vpn;

// Re-export commonly used types
pub use error::{L2tpError, L2tpResult, ResultExt, Severity};
pub use config::{Elevation, L2tpConfig};
pub use command::{CommandOutput, CommandRunner, CommandSpec, SystemCommandRunner};
pub use install::PackageInstaller;
pub use routing::{RouteEntry, RouteManager};
pub use vpn::{
    render, ConfigArtifact, ConfigGenerator, ConnectionLauncher, Credentials, PollPolicy,
    ReadinessOutcome, ReadinessPoller, SecretFileWriter, SessionOutcome, VpnSession,
};
