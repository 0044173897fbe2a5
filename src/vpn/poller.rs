//! Tunnel readiness polling
//!
//! strongSwan and pppd come up independently and with unpredictable timing,
//! so a failing status query is treated as "not ready yet" rather than as an
//! error. Only the overall timeout ends polling unsuccessfully.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::command::{run_checked, CommandRunner, CommandSpec};
use crate::config::{L2tpConfig, PollSettings};
use crate::error::{L2tpError, L2tpResult};
use super::status::{ReadinessSignal, StatusParser};

/// Spacing and deadline for readiness checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&PollSettings::default())
    }
}

impl From<&PollSettings> for PollPolicy {
    fn from(settings: &PollSettings) -> Self {
        Self {
            interval: settings.interval(),
            timeout: settings.timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Polling,
    Ready,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessOutcome {
    Ready,
    /// `diagnostic` is the daemon log as it was when polling gave up
    TimedOut { diagnostic: String },
}

pub struct ReadinessPoller {
    runner: Arc<dyn CommandRunner>,
    parser: Arc<dyn StatusParser>,
    policy: PollPolicy,
    connection_name: String,
    tunnel_interface: String,
    daemon_log: PathBuf,
    sudo: bool,
    state: PollState,
}

impl ReadinessPoller {
    pub fn new(config: &L2tpConfig, runner: Arc<dyn CommandRunner>, parser: Arc<dyn StatusParser>) -> Self {
        Self {
            runner,
            parser,
            policy: PollPolicy::from(&config.poll),
            connection_name: config.tunnel.connection_name.clone(),
            tunnel_interface: config.tunnel.tunnel_interface.clone(),
            daemon_log: config.paths.daemon_log.clone(),
            sudo: config.elevation.needs_sudo(),
            state: PollState::Polling,
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// Poll until both predicates hold in the same tick or the timeout passes
    pub async fn await_ready(&mut self) -> ReadinessOutcome {
        self.state = PollState::Polling;
        let started = Instant::now();
        let mut tick: u64 = 0;

        info!(
            "Waiting for {} and {} (timeout {:?}, interval {:?})",
            self.connection_name, self.tunnel_interface, self.policy.timeout, self.policy.interval
        );

        loop {
            tick += 1;
            let signal = self.sample().await;
            debug!("Readiness tick {}: {:?}", tick, signal);

            if signal.is_ready() {
                self.state = PollState::Ready;
                info!("Tunnel ready after {:?} ({} checks)", started.elapsed(), tick);
                return ReadinessOutcome::Ready;
            }

            if started.elapsed() >= self.policy.timeout {
                self.state = PollState::TimedOut;
                warn!("Tunnel not ready after {:?} (last signal {:?})", started.elapsed(), signal);
                let diagnostic = self.read_diagnostic().await;
                return ReadinessOutcome::TimedOut { diagnostic };
            }

            sleep(self.policy.interval).await;
        }
    }

    /// Query both subsystems once; a failed query reads as "not yet"
    pub async fn sample(&self) -> ReadinessSignal {
        let ipsec_established = match self.query(self.ipsec_status_cmd()).await {
            Ok(text) => self.parser.parse_ipsec_status(&text),
            Err(e) => {
                debug!("{} (retrying)", e);
                false
            }
        };

        let ppp_interface_up = match self.query(self.interface_cmd()).await {
            Ok(text) => self.parser.parse_interface_state(&text),
            Err(e) => {
                debug!("{} (retrying)", e);
                false
            }
        };

        ReadinessSignal {
            ipsec_established,
            ppp_interface_up,
        }
    }

    fn ipsec_status_cmd(&self) -> CommandSpec {
        CommandSpec::new("ipsec")
            .args(["status", self.connection_name.as_str()])
            .privileged(self.sudo)
    }

    fn interface_cmd(&self) -> CommandSpec {
        CommandSpec::new("ip").args(["addr", "show", "dev", self.tunnel_interface.as_str()])
    }

    /// Run a status query; any failure is a recoverable `StatusQuery` error
    async fn query(&self, cmd: CommandSpec) -> L2tpResult<String> {
        let cmd_str = cmd.to_string();
        run_checked(self.runner.as_ref(), cmd)
            .await
            .map(|output| output.stdout)
            .map_err(|e| L2tpError::StatusQuery {
                cmd: cmd_str,
                reason: e.to_string(),
            })
    }

    /// The daemon log, or a note on why it could not be read
    async fn read_diagnostic(&self) -> String {
        let cmd = CommandSpec::new("cat")
            .arg(self.daemon_log.display().to_string())
            .privileged(self.sudo);

        match run_checked(self.runner.as_ref(), cmd).await {
            Ok(output) => output.stdout,
            Err(e) => {
                warn!("Could not read {:?}: {}", self.daemon_log, e);
                format!("(could not read {}: {})", self.daemon_log.display(), e)
            }
        }
    }
}
