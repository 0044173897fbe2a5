//! Configuration management for l2tpctl
//!
//! Everything has a default, so an empty TOML file (or no file at all) is a
//! valid configuration. The loaded value is passed into each component
//! constructor; nothing reads it from a global.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::{L2tpError, L2tpResult};

/// Main l2tpctl configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct L2tpConfig {
    /// How privileged commands are run
    pub elevation: Elevation,
    /// Where artifacts and runtime files live
    pub paths: ConfigPaths,
    /// Tunnel naming and DNS
    pub tunnel: TunnelSettings,
    /// Readiness polling
    pub poll: PollSettings,
    /// Package installation
    pub install: InstallSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPaths {
    /// strongSwan connection definitions
    pub ipsec_conf: PathBuf,
    /// strongSwan PSK store
    pub ipsec_secrets: PathBuf,
    /// pppd options used by the xl2tpd LAC
    pub ppp_options: PathBuf,
    /// xl2tpd daemon configuration
    pub xl2tpd_conf: PathBuf,
    /// Generated resolver file
    pub resolv_conf: PathBuf,
    /// Active resolver path, linked to `resolv_conf` once the tunnel is up
    pub resolv_link: PathBuf,
    /// pppd/xl2tpd debug log
    pub daemon_log: PathBuf,
    /// xl2tpd control pipe
    pub control_socket: PathBuf,
    /// Unprivileged directory where artifacts are staged before being moved
    pub staging_dir: PathBuf,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self {
            ipsec_conf: PathBuf::from("/etc/ipsec.conf"),
            ipsec_secrets: PathBuf::from("/etc/ipsec.secrets"),
            ppp_options: PathBuf::from("/etc/ppp/options.l2tpd.client"),
            xl2tpd_conf: PathBuf::from("/etc/xl2tpd/xl2tpd.conf"),
            resolv_conf: PathBuf::from("/etc/ppp/resolv.conf.l2tp"),
            resolv_link: PathBuf::from("/etc/resolv.conf"),
            daemon_log: PathBuf::from("/var/log/xl2tpd.log"),
            control_socket: PathBuf::from("/var/run/xl2tpd/l2tp-control"),
            staging_dir: std::env::temp_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelSettings {
    /// strongSwan connection name, also matched in `ipsec status` output
    pub connection_name: String,
    /// xl2tpd LAC section name
    pub lac_name: String,
    /// Interface pppd brings up
    pub tunnel_interface: String,
    /// Interface the host used before the tunnel. Discovered from the
    /// gateway lookup when unset.
    pub physical_interface: Option<String>,
    /// Nameservers written to the resolver artifact
    pub nameservers: Vec<String>,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            connection_name: "L2TP-PSK".to_string(),
            lac_name: "vpn".to_string(),
            tunnel_interface: "ppp0".to_string(),
            physical_interface: None,
            nameservers: vec!["1.1.1.1".to_string(), "8.8.8.8".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// Delay between readiness checks (milliseconds)
    pub interval_ms: u64,
    /// Give up after this long (milliseconds)
    pub timeout_ms: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            timeout_ms: 30_000,
        }
    }
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Privilege escalation mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Elevation {
    /// Use sudo unless already running as root
    #[default]
    Auto,
    /// Always prefix with sudo
    Sudo,
    /// Never elevate
    Never,
}

impl Elevation {
    /// Whether privileged commands need a `sudo` prefix
    pub fn needs_sudo(self) -> bool {
        match self {
            Elevation::Auto => !is_root(),
            Elevation::Sudo => true,
            Elevation::Never => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallSettings {
    /// Skip package installation entirely
    pub skip: bool,
    /// Packages passed to apt-get
    pub packages: Vec<String>,
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            skip: false,
            packages: vec!["strongswan".to_string(), "xl2tpd".to_string(), "ppp".to_string()],
        }
    }
}

fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

impl L2tpConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> L2tpResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| L2tpError::ConfigError(format!("Failed to read config: {}", e)))?;

        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> L2tpResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| L2tpError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| L2tpError::ConfigError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }
}
