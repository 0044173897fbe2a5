//! Daemon startup
//!
//! strongSwan is started first so the transport-mode SA can be negotiated as
//! soon as xl2tpd dials. Neither start is awaited beyond process exit; the
//! readiness poller decides whether the tunnel actually came up.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::command::{run_checked, CommandRunner, CommandSpec};
use crate::config::L2tpConfig;
use crate::error::{L2tpError, L2tpResult};

pub struct ConnectionLauncher {
    runner: Arc<dyn CommandRunner>,
    xl2tpd_conf: PathBuf,
    control_socket: PathBuf,
    sudo: bool,
}

impl ConnectionLauncher {
    pub fn new(config: &L2tpConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            xl2tpd_conf: config.paths.xl2tpd_conf.clone(),
            control_socket: config.paths.control_socket.clone(),
            sudo: config.elevation.needs_sudo(),
        }
    }

    /// Start strongSwan, then xl2tpd on its own control socket
    pub async fn launch(&self) -> L2tpResult<()> {
        if let Some(dir) = self.control_socket.parent() {
            self.start("create control directory", Self::mkdir_cmd(dir)).await?;
        }

        info!("Starting IPsec");
        self.start("start IPsec", CommandSpec::new("ipsec").arg("start")).await?;

        info!("Starting xl2tpd with {:?}", self.xl2tpd_conf);
        let xl2tpd = CommandSpec::new("xl2tpd")
            .arg("-c")
            .arg(self.xl2tpd_conf.display().to_string())
            .arg("-C")
            .arg(self.control_socket.display().to_string());
        self.start("start xl2tpd", xl2tpd).await?;

        Ok(())
    }

    fn mkdir_cmd(dir: &Path) -> CommandSpec {
        CommandSpec::new("mkdir").args(["-p".to_string(), dir.display().to_string()])
    }

    async fn start(&self, what: &str, cmd: CommandSpec) -> L2tpResult<()> {
        run_checked(self.runner.as_ref(), cmd.privileged(self.sudo))
            .await
            .map(|_| ())
            .map_err(|e| L2tpError::ServiceError(format!("Failed to {}: {}", what, e)))
    }
}
