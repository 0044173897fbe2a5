//! Host package installation
//!
//! CI runners start without strongSwan or xl2tpd, so they are installed with
//! apt-get before any configuration is written.

use std::sync::Arc;
use tracing::info;

use crate::command::{run_checked, CommandRunner, CommandSpec};
use crate::config::L2tpConfig;
use crate::error::{L2tpError, L2tpResult};

pub struct PackageInstaller {
    runner: Arc<dyn CommandRunner>,
    packages: Vec<String>,
    skip: bool,
    sudo: bool,
}

impl PackageInstaller {
    pub fn new(config: &L2tpConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            packages: config.install.packages.clone(),
            skip: config.install.skip,
            sudo: config.elevation.needs_sudo(),
        }
    }

    /// Refresh the package index and install the configured packages
    pub async fn install(&self) -> L2tpResult<()> {
        if self.skip || self.packages.is_empty() {
            info!("Skipping package installation");
            return Ok(());
        }

        info!("Installing {}", self.packages.join(", "));

        self.apt(CommandSpec::new("apt-get").arg("update")).await?;
        self.apt(
            CommandSpec::new("apt-get")
                .args(["install", "-y"])
                .args(self.packages.iter().cloned()),
        )
        .await?;

        Ok(())
    }

    async fn apt(&self, cmd: CommandSpec) -> L2tpResult<()> {
        let cmd = cmd.env("DEBIAN_FRONTEND", "noninteractive").privileged(self.sudo);
        run_checked(self.runner.as_ref(), cmd)
            .await
            .map(|_| ())
            .map_err(|e| L2tpError::ServiceError(format!("Package installation failed: {}", e)))
    }
}
