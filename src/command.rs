//! External command execution
//!
//! All process invocations (ipsec, xl2tpd, ip, apt-get, file moves under
//! sudo) go through [`CommandRunner`] so tests can script outputs without
//! touching the host.

use async_trait::async_trait;
use std::fmt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{L2tpError, L2tpResult};
use crate::validation;

/// A command line to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Wrap in `sudo` when `sudo` is true
    ///
    /// sudo resets the environment, so variables are passed through `env`.
    pub fn privileged(self, sudo: bool) -> Self {
        if !sudo {
            return self;
        }

        let mut args = Vec::with_capacity(self.args.len() + self.envs.len() + 2);
        if !self.envs.is_empty() {
            args.push("env".to_string());
            args.extend(self.envs.iter().map(|(k, v)| format!("{}={}", k, v)));
        }
        args.push(self.program);
        args.extend(self.args);

        Self {
            program: "sudo".to_string(),
            args,
            envs: Vec::new(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs external commands
///
/// `Err` means the process could not be started at all; a non-zero exit
/// is reported through [`CommandOutput::code`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, cmd: CommandSpec) -> L2tpResult<CommandOutput>;
}

/// Runs commands on the host with tokio
#[derive(Debug, Default, Clone)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, cmd: CommandSpec) -> L2tpResult<CommandOutput> {
        debug!("Running: {}", cmd);

        let output = Command::new(&cmd.program)
            .args(&cmd.args)
            .envs(cmd.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| L2tpError::CommandFailed {
                cmd: cmd.to_string(),
                code: None,
                stderr: e.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Run a command and turn a non-zero exit into [`L2tpError::CommandFailed`]
pub async fn run_checked(runner: &dyn CommandRunner, cmd: CommandSpec) -> L2tpResult<CommandOutput> {
    let cmd_str = cmd.to_string();
    let output = runner.run(cmd).await?;

    if !output.success() {
        return Err(L2tpError::CommandFailed {
            cmd: cmd_str,
            code: output.code,
            stderr: validation::sanitize_error_message(&output.stderr),
        });
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privileged_wraps_in_sudo() {
        let cmd = CommandSpec::new("ip")
            .args(["route", "add", "203.0.113.5"])
            .privileged(true);

        assert_eq!(cmd.program, "sudo");
        assert_eq!(cmd.args, vec!["ip", "route", "add", "203.0.113.5"]);
        assert_eq!(cmd.to_string(), "sudo ip route add 203.0.113.5");
    }

    #[test]
    fn test_privileged_passes_env_through() {
        let cmd = CommandSpec::new("apt-get")
            .args(["install", "-y", "xl2tpd"])
            .env("DEBIAN_FRONTEND", "noninteractive")
            .privileged(true);

        assert_eq!(
            cmd.to_string(),
            "sudo env DEBIAN_FRONTEND=noninteractive apt-get install -y xl2tpd"
        );
        assert!(cmd.envs.is_empty());
    }

    #[test]
    fn test_unprivileged_is_untouched() {
        let cmd = CommandSpec::new("ipsec").arg("start");
        assert_eq!(cmd.clone().privileged(false), cmd);
    }

    #[tokio::test]
    async fn test_system_runner_captures_output() {
        let runner = SystemCommandRunner::new();
        let output = runner
            .run(CommandSpec::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]))
            .await
            .unwrap();

        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_system_runner_spawn_failure() {
        let runner = SystemCommandRunner::new();
        let err = runner
            .run(CommandSpec::new("/nonexistent/l2tpctl-test-binary"))
            .await
            .unwrap_err();

        assert!(matches!(err, L2tpError::CommandFailed { code: None, .. }));
    }

    #[tokio::test]
    async fn test_run_checked_rejects_non_zero() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_| Ok(CommandOutput::failed(1, "ipsec: command not found")));

        let err = run_checked(&runner, CommandSpec::new("ipsec").arg("start"))
            .await
            .unwrap_err();

        match err {
            L2tpError::CommandFailed { cmd, code, stderr } => {
                assert_eq!(cmd, "ipsec start");
                assert_eq!(code, Some(1));
                assert_eq!(stderr, "ipsec: command not found");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
