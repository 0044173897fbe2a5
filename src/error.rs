//! Error types for l2tpctl
//!
//! Every error carries a [`Severity`]. Only resolver linking and status
//! queries made while polling are recoverable; everything else aborts the run.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Whether an error ends the run or merely degrades it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Fatal,
    Recoverable,
}

#[derive(Debug, Error)]
pub enum L2tpError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Command execution failed
    #[error("Command '{cmd}' failed{}: {stderr}", code_suffix(.code))]
    CommandFailed { cmd: String, code: Option<i32>, stderr: String },

    /// Required input was not supplied
    #[error("Missing required input: {0}")]
    MissingInput(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A protected artifact could not be written, moved or chmod'ed
    #[error("Failed to write {path:?}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },

    /// Daemon or service failed to start
    #[error("Service error: {0}")]
    ServiceError(String),

    /// The tunnel did not come up in time
    #[error("Timeout: tunnel not ready after {timeout:?}\n--- xl2tpd log ---\n{log}")]
    ReadinessTimeout { timeout: Duration, log: String },

    /// No gateway towards the VPN server could be determined
    #[error("Could not determine gateway to {server}: {detail}")]
    GatewayNotFound { server: String, detail: String },

    /// Route installation failed
    #[error("Route error: {0}")]
    RouteFailed(String),

    /// Resolver symlink could not be installed
    #[error("Failed to link {link:?} -> {target:?}: {reason}")]
    ResolverLink { target: PathBuf, link: PathBuf, reason: String },

    /// A status query failed while polling
    #[error("Status query '{cmd}' failed: {reason}")]
    StatusQuery { cmd: String, reason: String },

    /// Parse error
    #[error("Parse error: {0}")]
    ParseError(String),
}

fn code_suffix(code: &Option<i32>) -> String {
    code.map(|c| format!(" with code {}", c)).unwrap_or_default()
}

impl L2tpError {
    pub fn severity(&self) -> Severity {
        match self {
            L2tpError::ResolverLink { .. } | L2tpError::StatusQuery { .. } => Severity::Recoverable,
            _ => Severity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl From<toml::de::Error> for L2tpError {
    fn from(error: toml::de::Error) -> Self {
        L2tpError::ConfigError(error.to_string())
    }
}

pub type L2tpResult<T> = Result<T, L2tpError>;

/// Applies the propagation policy to a component result
pub trait ResultExt<T> {
    /// Recoverable errors are logged and become `Ok(None)`; fatal ones propagate.
    fn or_degrade(self) -> L2tpResult<Option<T>>;
}

impl<T> ResultExt<T> for L2tpResult<T> {
    fn or_degrade(self) -> L2tpResult<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if !e.is_fatal() => {
                warn!("{} (continuing)", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
