//! One VPN session from package install to routed tunnel
//!
//! Stages run strictly in order and every stage except resolver linking is
//! fatal. Nothing is rolled back: routes and daemons left behind by a failed
//! run stay in place for the lifetime of the host.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::command::CommandRunner;
use crate::config::L2tpConfig;
use crate::error::{L2tpError, L2tpResult, ResultExt};
use crate::install::PackageInstaller;
use crate::routing::{RouteEntry, RouteManager};
use super::artifacts::{ConfigArtifact, ConfigGenerator};
use super::credentials::Credentials;
use super::launcher::ConnectionLauncher;
use super::poller::{ReadinessOutcome, ReadinessPoller};
use super::status::RegexStatusParser;
use super::writer::{ElevatedWriter, LocalWriter, PrivilegedWriter, SecretFileWriter};

/// What an established session changed on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    /// Host route to the server, then the default route
    pub routes: Vec<RouteEntry>,
    /// False if the resolver symlink could not be installed
    pub resolver_linked: bool,
}

pub struct VpnSession {
    credentials: Credentials,
    resolv_conf: PathBuf,
    resolv_link: PathBuf,
    installer: PackageInstaller,
    generator: ConfigGenerator,
    writer: SecretFileWriter,
    launcher: ConnectionLauncher,
    poller: ReadinessPoller,
    routes: RouteManager,
}

impl VpnSession {
    /// Session that writes artifacts through `sudo` as configured
    pub fn new(config: &L2tpConfig, credentials: Credentials, runner: Arc<dyn CommandRunner>) -> L2tpResult<Self> {
        let writer = Arc::new(ElevatedWriter::new(runner.clone(), config.elevation.needs_sudo()));
        Self::with_writer(config, credentials, runner, writer)
    }

    pub fn with_writer(
        config: &L2tpConfig,
        credentials: Credentials,
        runner: Arc<dyn CommandRunner>,
        writer: Arc<dyn PrivilegedWriter>,
    ) -> L2tpResult<Self> {
        let parser = Arc::new(RegexStatusParser::new(&config.tunnel.connection_name)?);

        Ok(Self {
            credentials,
            resolv_conf: config.paths.resolv_conf.clone(),
            resolv_link: config.paths.resolv_link.clone(),
            installer: PackageInstaller::new(config, runner.clone()),
            generator: ConfigGenerator::new(config),
            writer: SecretFileWriter::new(writer, config.paths.staging_dir.clone()),
            launcher: ConnectionLauncher::new(config, runner.clone()),
            poller: ReadinessPoller::new(config, runner.clone(), parser),
            routes: RouteManager::new(config, runner)?,
        })
    }

    /// Bring the tunnel up and route through it
    ///
    /// Consumes the session; a process runs at most one.
    pub async fn establish(mut self) -> L2tpResult<SessionOutcome> {
        info!("Connecting to {}", self.credentials.server());

        self.installer.install().await?;

        let artifacts = self.generator.generate(&self.credentials);
        self.writer.write_all(&artifacts).await?;

        self.launcher.launch().await?;

        if let ReadinessOutcome::TimedOut { diagnostic } = self.poller.await_ready().await {
            return Err(L2tpError::ReadinessTimeout {
                timeout: self.poller.policy().timeout,
                log: diagnostic,
            });
        }

        let routes = self.routes.commit_routes(self.credentials.server()).await?;

        let resolver_linked = self
            .writer
            .symlink_protected(&self.resolv_conf, &self.resolv_link)
            .await
            .or_degrade()?
            .is_some();
        if !resolver_linked {
            warn!("Tunnel is up but {:?} still points at the host resolver", self.resolv_link);
        }

        info!("VPN connection to {} established", self.credentials.server());
        Ok(SessionOutcome { routes, resolver_linked })
    }
}

/// Write every artifact into `output_dir` as the current user
///
/// File names match the final system paths. Returns the written paths.
pub async fn render(config: &L2tpConfig, credentials: &Credentials, output_dir: &Path) -> L2tpResult<Vec<PathBuf>> {
    tokio::fs::create_dir_all(output_dir).await?;

    let artifacts: Vec<ConfigArtifact> = ConfigGenerator::new(config)
        .generate(credentials)
        .into_iter()
        .map(|mut artifact| -> L2tpResult<ConfigArtifact> {
            let name = artifact
                .path
                .file_name()
                .map(|n| n.to_os_string())
                .ok_or_else(|| L2tpError::InvalidParameter(format!("{:?} has no file name", artifact.path)))?;
            artifact.path = output_dir.join(name);
            Ok(artifact)
        })
        .collect::<L2tpResult<_>>()?;

    let writer = SecretFileWriter::new(Arc::new(LocalWriter::new()), output_dir.to_path_buf());
    writer.write_all(&artifacts).await?;

    Ok(artifacts.into_iter().map(|a| a.path).collect())
}
